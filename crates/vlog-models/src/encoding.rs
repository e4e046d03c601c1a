//! Clip encoding profiles.

use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "veryfast";
/// Default CRF; clips only feed a model, so quality can be modest
pub const DEFAULT_CRF: u8 = 28;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "96k";
/// Default container extension
pub const DEFAULT_EXTENSION: &str = "mp4";

/// How window clips are encoded.
///
/// Clips are always re-encoded so that cuts land on the requested timestamps
/// rather than the nearest keyframe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingProfile {
    /// Video codec (e.g., "libx264", "libvpx-vp9")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset; ignored for codecs without presets
    #[serde(default)]
    pub preset: Option<String>,

    /// Constant Rate Factor (quality, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Target video bitrate, required by some codecs alongside CRF
    #[serde(default)]
    pub video_bitrate: Option<String>,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Output container extension without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: Some(DEFAULT_PRESET.to_string()),
            crf: DEFAULT_CRF,
            video_bitrate: None,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
            extra_args: vec!["-movflags".to_string(), "+faststart".to_string()],
        }
    }
}

impl EncodingProfile {
    /// H.264/AAC in MP4.
    pub fn mp4() -> Self {
        Self::default()
    }

    /// VP9/Opus in WebM.
    pub fn webm() -> Self {
        Self {
            codec: "libvpx-vp9".to_string(),
            preset: None,
            crf: 30,
            video_bitrate: Some("1M".to_string()),
            audio_codec: "libopus".to_string(),
            audio_bitrate: "64k".to_string(),
            extension: "webm".to_string(),
            extra_args: vec!["-deadline".to_string(), "realtime".to_string()],
        }
    }

    /// Look up a profile by container name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mp4" | "h264" => Some(Self::mp4()),
            "webm" | "vp9" => Some(Self::webm()),
            _ => None,
        }
    }

    /// Returns a new profile with updated CRF.
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    /// File name for a clip with this profile's extension.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension)
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec.clone()];

        if let Some(preset) = &self.preset {
            args.extend_from_slice(&["-preset".to_string(), preset.clone()]);
        }

        args.extend_from_slice(&["-crf".to_string(), self.crf.to_string()]);

        if let Some(bitrate) = &self.video_bitrate {
            args.extend_from_slice(&["-b:v".to_string(), bitrate.clone()]);
        }

        args.extend_from_slice(&[
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]);

        args.extend(self.extra_args.clone());

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_h264_mp4() {
        let profile = EncodingProfile::default();
        let args = profile.to_ffmpeg_args();
        assert_eq!(&args[..4], &["-c:v", "libx264", "-preset", "veryfast"]);
        assert!(args.windows(2).any(|w| w == ["-crf", "28"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert_eq!(profile.file_name("w0"), "w0.mp4");
    }

    #[test]
    fn test_webm_profile() {
        let profile = EncodingProfile::by_name("WebM").unwrap();
        let args = profile.to_ffmpeg_args();
        assert!(!args.contains(&"-preset".to_string()));
        assert!(args.windows(2).any(|w| w == ["-b:v", "1M"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "libopus"]));
        assert_eq!(profile.file_name("w3"), "w3.webm");
        assert!(EncodingProfile::by_name("avi").is_none());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let profile: EncodingProfile = serde_json::from_str(r#"{"crf": 20}"#).unwrap();
        assert_eq!(profile.crf, 20);
        assert_eq!(profile.codec, DEFAULT_VIDEO_CODEC);
        assert_eq!(profile.extension, "mp4");
        assert!(profile.preset.is_none());
    }
}
