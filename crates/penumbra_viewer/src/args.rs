//! Command line options

use std::path::PathBuf;

const USAGE: &str = "usage: penumbra_viewer [--frames N] [--out DIR] [--config FILE] [--size WxH]";

/// Viewer options
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerArgs {
    /// Frames to simulate and render
    pub frames: u32,
    /// Directory the images are written to
    pub out_dir: PathBuf,
    /// Renderer configuration (JSON)
    pub config: Option<PathBuf>,
    /// Output size in pixels
    pub width: u32,
    pub height: u32,
}

impl Default for ViewerArgs {
    fn default() -> Self {
        Self {
            frames: 60,
            out_dir: PathBuf::from("."),
            config: None,
            width: 640,
            height: 480,
        }
    }
}

impl ViewerArgs {
    /// Parse options, skipping the program name
    pub fn parse<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = args.into_iter().skip(1);

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| format!("{} needs a value\n{}", flag, USAGE))
            };
            match arg.as_str() {
                "--frames" => {
                    let raw = value("--frames")?;
                    parsed.frames = raw
                        .parse()
                        .map_err(|_| format!("invalid frame count '{}'", raw))?;
                }
                "--out" => parsed.out_dir = PathBuf::from(value("--out")?),
                "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
                "--size" => {
                    let raw = value("--size")?;
                    let (width, height) =
                        parse_size(&raw).ok_or_else(|| format!("invalid size '{}'", raw))?;
                    parsed.width = width;
                    parsed.height = height;
                }
                "-h" | "--help" => return Err(USAGE.to_string()),
                other => return Err(format!("unknown argument '{}'\n{}", other, USAGE)),
            }
        }

        Ok(parsed)
    }
}

fn parse_size(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.split_once('x')?;
    let (w, h) = (w.parse().ok()?, h.parse().ok()?);
    (w > 0 && h > 0).then_some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ViewerArgs, String> {
        let argv = std::iter::once("penumbra_viewer").chain(args.iter().copied());
        ViewerArgs::parse(argv.map(String::from))
    }

    #[test]
    fn test_defaults() {
        assert_eq!(parse(&[]).unwrap(), ViewerArgs::default());
    }

    #[test]
    fn test_all_flags() {
        let args = parse(&[
            "--frames",
            "5",
            "--out",
            "/tmp/out",
            "--config",
            "scene.json",
            "--size",
            "320x200",
        ])
        .unwrap();
        assert_eq!(args.frames, 5);
        assert_eq!(args.out_dir, PathBuf::from("/tmp/out"));
        assert_eq!(args.config, Some(PathBuf::from("scene.json")));
        assert_eq!((args.width, args.height), (320, 200));
    }

    #[test]
    fn test_bad_input() {
        assert!(parse(&["--frames"]).is_err());
        assert!(parse(&["--frames", "many"]).is_err());
        assert!(parse(&["--size", "0x10"]).is_err());
        assert!(parse(&["--wat"]).is_err());
    }
}
