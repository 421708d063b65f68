//! Content-calendar platforms and the post formats each one accepts

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Facebook,
    Tiktok,
    Linkedin,
    Twitter,
    Youtube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PostFormat {
    Post,
    Carousel,
    Reel,
    Story,
    Video,
    Short,
    Article,
    Thread,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Instagram,
        Platform::Facebook,
        Platform::Tiktok,
        Platform::Linkedin,
        Platform::Twitter,
        Platform::Youtube,
    ];

    /// Formats a post on this platform may take
    pub fn allowed_formats(self) -> &'static [PostFormat] {
        use PostFormat::*;
        match self {
            Platform::Instagram => &[Post, Carousel, Reel, Story],
            Platform::Facebook => &[Post, Carousel, Reel, Story, Video],
            Platform::Tiktok => &[Video, Story],
            Platform::Linkedin => &[Post, Carousel, Article, Video],
            Platform::Twitter => &[Post, Thread, Video],
            Platform::Youtube => &[Video, Short],
        }
    }

    pub fn accepts(self, format: PostFormat) -> bool {
        self.allowed_formats().contains(&format)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
            Platform::Tiktok => "tiktok",
            Platform::Linkedin => "linkedin",
            Platform::Twitter => "twitter",
            Platform::Youtube => "youtube",
        }
    }
}

impl PostFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PostFormat::Post => "post",
            PostFormat::Carousel => "carousel",
            PostFormat::Reel => "reel",
            PostFormat::Story => "story",
            PostFormat::Video => "video",
            PostFormat::Short => "short",
            PostFormat::Article => "article",
            PostFormat::Thread => "thread",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("format '{}' is not available on {}", format.as_str(), platform.as_str())]
pub struct FormatError {
    pub platform: Platform,
    pub format: PostFormat,
}

pub fn validate_format(platform: Platform, format: PostFormat) -> Result<(), FormatError> {
    if platform.accepts(format) {
        Ok(())
    } else {
        Err(FormatError { platform, format })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_depend_on_platform() {
        assert!(validate_format(Platform::Instagram, PostFormat::Reel).is_ok());
        assert!(validate_format(Platform::Youtube, PostFormat::Short).is_ok());

        let err = validate_format(Platform::Tiktok, PostFormat::Carousel).unwrap_err();
        assert_eq!(err.to_string(), "format 'carousel' is not available on tiktok");
        assert!(validate_format(Platform::Instagram, PostFormat::Article).is_err());
    }

    #[test]
    fn every_platform_has_formats() {
        for platform in Platform::ALL {
            assert!(!platform.allowed_formats().is_empty(), "{platform:?}");
        }
    }

    #[test]
    fn serde_names_are_lowercase() {
        let p: Platform = serde_json::from_str("\"linkedin\"").unwrap();
        assert_eq!(p, Platform::Linkedin);
        assert_eq!(serde_json::to_string(&PostFormat::Carousel).unwrap(), "\"carousel\"");
    }
}
