use serde_json::Value;
use std::time::Duration;

/// Information about an [`Input`] source.
///
/// [`Input`]: super::Input
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Metadata {
    /// The title of this stream.
    pub title: Option<String>,
    /// The main artist of this stream.
    pub artist: Option<String>,
    /// The reported duration of this stream.
    pub duration: Option<Duration>,
    /// The number of audio channels in the source, before any conversion.
    pub channels: Option<u8>,
    /// The sample rate of the source, before any conversion.
    pub sample_rate: Option<u32>,
    /// The file or URL this stream was opened from.
    pub source_url: Option<String>,
}

impl Metadata {
    /// Extract metadata and details from the output of
    /// `ffprobe -of json -show_format -show_streams`.
    pub fn from_ffprobe_json(value: &Value) -> Self {
        let format = value.get("format");

        let duration = format
            .and_then(|m| m.get("duration"))
            .and_then(Value::as_str)
            .and_then(|v| v.parse::<f64>().ok())
            .map(Duration::from_secs_f64);

        let tags = format.and_then(|m| m.get("tags"));
        let tag = |name: &str| {
            tags.and_then(|m| m.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let stream = value
            .get("streams")
            .and_then(Value::as_array)
            .and_then(|v| {
                v.iter()
                    .find(|line| line.get("codec_type").and_then(Value::as_str) == Some("audio"))
            });

        let channels = stream
            .and_then(|m| m.get("channels"))
            .and_then(Value::as_u64)
            .and_then(|v| u8::try_from(v).ok());

        let sample_rate = stream
            .and_then(|m| m.get("sample_rate"))
            .and_then(Value::as_str)
            .and_then(|v| v.parse::<u32>().ok());

        Self {
            title: tag("title"),
            artist: tag("artist"),
            duration,
            channels,
            sample_rate,
            source_url: format
                .and_then(|m| m.get("filename"))
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ffprobe_output_is_read() {
        let value = json!({
            "streams": [
                {"codec_type": "video"},
                {"codec_type": "audio", "channels": 1, "sample_rate": "44100"},
            ],
            "format": {
                "filename": "song.flac",
                "duration": "12.500000",
                "tags": {"title": "Song", "artist": "Band"},
            },
        });

        let meta = Metadata::from_ffprobe_json(&value);
        assert_eq!(meta.title.as_deref(), Some("Song"));
        assert_eq!(meta.artist.as_deref(), Some("Band"));
        assert_eq!(meta.duration, Some(Duration::from_millis(12_500)));
        assert_eq!(meta.channels, Some(1));
        assert_eq!(meta.sample_rate, Some(44_100));
        assert_eq!(meta.source_url.as_deref(), Some("song.flac"));
    }

    #[test]
    fn missing_fields_stay_empty() {
        assert_eq!(Metadata::from_ffprobe_json(&json!({})), Metadata::default());
    }
}
