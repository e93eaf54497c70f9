use super::{error::Result, ChildContainer, Codec, Input, Metadata, Origin, Reader};
use std::{path::Path, process::Stdio};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Arguments which make `ffmpeg` write 48kHz stereo Ogg Opus to stdout, in
/// 20ms frames.
fn output_args(bitrate: i32) -> Vec<String> {
    [
        "-map",
        "0:a",
        "-acodec",
        "libopus",
        "-f",
        "opus",
        "-ar",
        "48000",
        "-ac",
        "2",
        "-b:a",
        &bitrate.to_string(),
        "-application",
        "audio",
        "-frame_duration",
        "20",
        "-loglevel",
        "warning",
        "pipe:1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Input {
    /// Opens any file `ffmpeg` understands, converting it to Ogg Opus in a child
    /// process.
    ///
    /// Metadata is gathered with `ffprobe` when available.
    pub async fn ffmpeg(path: impl AsRef<Path>) -> Result<Self> {
        Self::ffmpeg_with_bitrate(path, 128_000).await
    }

    /// As [`Input::ffmpeg`], with a chosen Opus bitrate in bits per second.
    #[instrument(skip(path))]
    pub async fn ffmpeg_with_bitrate(path: impl AsRef<Path>, bitrate: i32) -> Result<Self> {
        let path = path.as_ref();
        let metadata = probe(path).await.unwrap_or_else(|| Metadata {
            source_url: Some(path.display().to_string()),
            ..Default::default()
        });

        let child = Command::new("ffmpeg")
            .arg("-i")
            .arg(path)
            .args(output_args(bitrate))
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut input = Input::from_reader(Reader::Pipe(ChildContainer::new(child)?), Codec::Ogg)
            .with_metadata(metadata);
        input.origin = Some(Origin::Ffmpeg(path.to_path_buf()));

        Ok(input)
    }
}

async fn probe(path: &Path) -> Option<Metadata> {
    let out = Command::new("ffprobe")
        .args(["-v", "quiet", "-of", "json", "-show_format", "-show_streams", "-i"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;

    let value = serde_json::from_slice(&out.stdout[..]).ok()?;
    let metadata = Metadata::from_ffprobe_json(&value);

    debug!("FFprobe metadata {:?}", metadata);

    Some(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_stereo_ogg_opus_on_stdout() {
        let args = output_args(96_000);
        let pos = |a: &str| args.iter().position(|x| x == a).unwrap();

        assert_eq!(args[pos("-f") + 1], "opus");
        assert_eq!(args[pos("-ac") + 1], "2");
        assert_eq!(args[pos("-ar") + 1], "48000");
        assert_eq!(args[pos("-b:a") + 1], "96000");
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }
}
