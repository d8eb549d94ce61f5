use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Reply language. Anything other than Italian or Spanish is served in English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Locale {
    It,
    Es,
    En,
}

impl Locale {
    /// Normalise a Telegram `language_code`; unknown or missing codes map to `En`.
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("it") => Locale::It,
            Some("es") => Locale::Es,
            _ => Locale::En,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::It => "it",
            Locale::Es => "es",
            Locale::En => "en",
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three kinds of sellable content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Photo,
    Audio,
    Video,
}

impl ContentKind {
    /// Classify a free-text request by keyword, case-insensitively.
    pub fn from_request(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("audio") {
            ContentKind::Audio
        } else if lower.contains("video") {
            ContentKind::Video
        } else {
            ContentKind::Photo
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Photo => "photo",
            ContentKind::Audio => "audio",
            ContentKind::Video => "video",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per supported locale.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PerLocale<T> {
    #[serde(default)]
    pub it: T,
    #[serde(default)]
    pub es: T,
    #[serde(default)]
    pub en: T,
}

impl<T> PerLocale<T> {
    pub fn get(&self, locale: Locale) -> &T {
        match locale {
            Locale::It => &self.it,
            Locale::Es => &self.es,
            Locale::En => &self.en,
        }
    }
}

/// Advertisement photo with a call-to-action button.
#[derive(Debug, Deserialize, Clone)]
pub struct Advertisement {
    pub file_id: String,
    pub caption: String,
    pub cta: String,
    pub url: String,
}

/// Read-only content tables loaded once at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Catalog {
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
    /// Audio clips are recorded per language.
    #[serde(default)]
    pub audio: PerLocale<Vec<String>>,
    #[serde(default)]
    pub captions: PerLocale<Vec<String>>,
    #[serde(default)]
    pub start: PerLocale<String>,
    pub advertisement: Option<Advertisement>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
        let catalog: Catalog = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;

        info!(
            "Catalog loaded: {} photos, {} videos, {} audio clips",
            catalog.photos.len(),
            catalog.videos.len(),
            catalog.audio.it.len() + catalog.audio.es.len() + catalog.audio.en.len()
        );
        Ok(catalog)
    }

    /// Uniform-random asset id for the kind; audio is chosen from the locale's pool.
    pub fn pick_asset<R: Rng + ?Sized>(
        &self,
        kind: ContentKind,
        locale: Locale,
        rng: &mut R,
    ) -> Option<&str> {
        let pool = match kind {
            ContentKind::Photo => &self.photos,
            ContentKind::Video => &self.videos,
            ContentKind::Audio => self.audio.get(locale),
        };
        pool.choose(rng).map(String::as_str)
    }

    pub fn pick_caption<R: Rng + ?Sized>(&self, locale: Locale, rng: &mut R) -> Option<&str> {
        self.captions.get(locale).choose(rng).map(String::as_str)
    }

    /// Start message for the locale, falling back to English when missing.
    pub fn start_message(&self, locale: Locale) -> &str {
        let text = self.start.get(locale);
        if text.is_empty() {
            &self.start.en
        } else {
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn catalog() -> Catalog {
        serde_json::from_value(serde_json::json!({
            "photos": ["p1", "p2"],
            "videos": ["v1"],
            "audio": { "it": ["a-it"], "es": ["a-es"], "en": ["a-en"] },
            "captions": { "it": ["Ciao"], "es": ["Hola"], "en": ["Hello"] },
            "start": { "it": "Benvenuto", "en": "Welcome" },
            "advertisement": null
        }))
        .unwrap()
    }

    #[test]
    fn test_locale_normalisation() {
        assert_eq!(Locale::from_code(Some("it")), Locale::It);
        assert_eq!(Locale::from_code(Some("es")), Locale::Es);
        assert_eq!(Locale::from_code(Some("de")), Locale::En);
        assert_eq!(Locale::from_code(Some("IT")), Locale::En);
        assert_eq!(Locale::from_code(None), Locale::En);
    }

    #[test]
    fn test_content_kind_keywords() {
        assert_eq!(ContentKind::from_request("send me an AUDIO"), ContentKind::Audio);
        assert_eq!(ContentKind::from_request("a Video please"), ContentKind::Video);
        assert_eq!(ContentKind::from_request("audio or video"), ContentKind::Audio);
        assert_eq!(ContentKind::from_request("!toEveryone! hi"), ContentKind::Photo);
        assert_eq!(ContentKind::from_request(""), ContentKind::Photo);
    }

    #[test]
    fn test_audio_and_captions_follow_locale() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(7);

        let de = Locale::from_code(Some("de"));
        assert_eq!(catalog.pick_asset(ContentKind::Audio, de, &mut rng), Some("a-en"));
        assert_eq!(catalog.pick_caption(de, &mut rng), Some("Hello"));
        assert_eq!(
            catalog.pick_asset(ContentKind::Audio, Locale::Es, &mut rng),
            Some("a-es")
        );
        assert_eq!(catalog.pick_asset(ContentKind::Video, Locale::It, &mut rng), Some("v1"));
    }

    #[test]
    fn test_photo_pick_stays_in_pool() {
        let catalog = catalog();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let id = catalog
                .pick_asset(ContentKind::Photo, Locale::En, &mut rng)
                .unwrap();
            assert!(id == "p1" || id == "p2");
        }
    }

    #[test]
    fn test_empty_pool_yields_none() {
        let mut catalog = catalog();
        catalog.videos.clear();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(catalog
            .pick_asset(ContentKind::Video, Locale::En, &mut rng)
            .is_none());
    }

    #[test]
    fn test_start_message_falls_back_to_english() {
        let catalog = catalog();
        assert_eq!(catalog.start_message(Locale::It), "Benvenuto");
        assert_eq!(catalog.start_message(Locale::Es), "Welcome");
    }
}
