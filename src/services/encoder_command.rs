//! Argument templates for the encoder binary.

use crate::config::EncoderConfig;
use crate::models::{SourceSpec, StreamUrls};

/// Fully resolved encoder invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl EncoderCommand {
    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct EncoderCommandBuilder {
    program: String,
    camera_device: String,
    screen_device: String,
    urls: StreamUrls,
}

impl EncoderCommandBuilder {
    pub fn new(config: &EncoderConfig, urls: StreamUrls) -> Self {
        Self {
            program: config.ffmpeg_command.clone(),
            camera_device: config.camera_device.clone(),
            screen_device: config.screen_device.clone(),
            urls,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn build(&self, path_id: &str, source: &SourceSpec) -> EncoderCommand {
        let mut args: Vec<String> = vec!["-hide_banner".into()];
        args.extend(self.input_args(source));
        args.extend(
            [
                "-c:v", "libx264", "-preset", "veryfast", "-maxrate", "1000k", "-bufsize",
                "2000k", "-g", "50", "-pix_fmt", "yuv420p", "-c:a", "aac", "-ar", "44100",
                "-b:a", "128k", "-f", "flv",
            ]
            .map(String::from),
        );
        args.push(self.urls.ingest_url(path_id));

        EncoderCommand {
            program: self.program.clone(),
            args,
        }
    }

    fn input_args(&self, source: &SourceSpec) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        match source {
            SourceSpec::File { path, looping } => {
                if *looping {
                    args.extend(["-stream_loop", "-1"].map(String::from));
                }
                args.extend(["-re", "-i"].map(String::from));
                args.push(path.to_string_lossy().into_owned());
                args.push("-copyts".into());
            }
            SourceSpec::Camera => {
                let format = if cfg!(windows) { "dshow" } else { "v4l2" };
                args.extend(["-f", format, "-i", self.camera_device.as_str()].map(String::from));
            }
            SourceSpec::Screen => {
                let format = if cfg!(windows) { "gdigrab" } else { "x11grab" };
                args.extend(
                    ["-f", format, "-framerate", "30", "-i", self.screen_device.as_str()].map(String::from),
                );
            }
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> EncoderCommandBuilder {
        EncoderCommandBuilder::new(&EncoderConfig::default(), StreamUrls::default())
    }

    #[test]
    fn test_looping_file_source() {
        let cmd = builder().build(
            "drone-1",
            &SourceSpec::File {
                path: "/media/flight.mp4".into(),
                looping: true,
            },
        );
        assert_eq!(cmd.program, "ffmpeg");
        assert_eq!(
            &cmd.args[..8],
            &["-hide_banner", "-stream_loop", "-1", "-re", "-i", "/media/flight.mp4", "-copyts", "-c:v"]
        );
        assert_eq!(cmd.args.last().unwrap(), "rtmp://localhost:1935/drone-1");
        assert_eq!(cmd.argv()[0], "ffmpeg");
    }

    #[test]
    fn test_single_pass_file_has_no_loop_flag() {
        let cmd = builder().build(
            "d",
            &SourceSpec::File {
                path: "clip.mp4".into(),
                looping: false,
            },
        );
        assert!(!cmd.args.contains(&"-stream_loop".to_string()));
        assert_eq!(cmd.args[1], "-re");
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_sources_use_platform_devices() {
        let camera = builder().build("cam", &SourceSpec::Camera);
        assert_eq!(&camera.args[1..5], &["-f", "v4l2", "-i", "/dev/video0"]);

        let screen = builder().build("fleet/screen", &SourceSpec::Screen);
        assert_eq!(
            &screen.args[1..7],
            &["-f", "x11grab", "-framerate", "30", "-i", ":0.0"]
        );
        assert_eq!(screen.args.last().unwrap(), "rtmp://localhost:1935/fleet/screen");
    }

    #[test]
    fn test_output_settings() {
        let cmd = builder().build("d", &SourceSpec::Camera);
        let joined = cmd.args.join(" ");
        assert!(joined.contains("-c:v libx264 -preset veryfast -maxrate 1000k -bufsize 2000k -g 50"));
        assert!(joined.contains("-c:a aac -ar 44100 -b:a 128k -f flv"));
    }
}
