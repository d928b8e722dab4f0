use anyhow::{anyhow, Context, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use unic_langid::LanguageIdentifier;

/// Languages with a message catalog
pub const SUPPORTED_LANGUAGES: [&str; 2] = ["ru", "en"];

/// Language used when the user's language is unknown or unsupported
pub const DEFAULT_LANGUAGE: &str = "ru";

const EMBEDDED_CATALOGS: [(&str, &str); 2] = [
    ("ru", include_str!("../locales/ru/main.ftl")),
    ("en", include_str!("../locales/en/main.ftl")),
];

/// Localization manager for the tour bot
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a manager from the catalogs compiled into the binary
    pub fn new() -> Result<Self> {
        Self::from_sources(
            EMBEDDED_CATALOGS
                .iter()
                .map(|(lang, source)| (lang.to_string(), source.to_string())),
        )
    }

    /// Load `<dir>/<lang>/main.ftl` for every supported language
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut sources = Vec::new();
        for lang in SUPPORTED_LANGUAGES {
            let path = dir.join(lang).join("main.ftl");
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read catalog {}", path.display()))?;
            sources.push((lang.to_string(), content));
        }
        info!(dir = %dir.display(), "Loaded message catalogs from disk");
        Self::from_sources(sources)
    }

    fn from_sources(sources: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let mut bundles = HashMap::new();
        for (lang, source) in sources {
            let bundle = Self::create_bundle(&lang, source)?;
            bundles.insert(lang, bundle);
        }
        Ok(Self { bundles })
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(lang: &str, source: String) -> Result<FluentBundle<FluentResource>> {
        let locale: LanguageIdentifier = lang
            .parse()
            .with_context(|| format!("Invalid language identifier: {lang}"))?;
        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        // Telegram renders the bidi isolation marks literally
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source)
            .map_err(|(_, errors)| anyhow!("Failed to parse {lang} catalog: {errors:?}"))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Conflicting messages in {lang} catalog: {errors:?}"))?;

        Ok(bundle)
    }

    /// Get a localized message, falling back to the default language
    pub fn get_message_in_language(&self, key: &str, language: &str, args: Option<&[(&str, &str)]>) -> String {
        let bundle = self
            .bundles
            .get(language)
            .filter(|bundle| bundle.has_message(key))
            .or_else(|| self.bundles.get(DEFAULT_LANGUAGE));

        let Some(bundle) = bundle else {
            return format!("Missing translation: {key}");
        };

        let pattern = match bundle.get_message(key).and_then(|msg| msg.value()) {
            Some(pattern) => pattern,
            None => return format!("Missing translation: {key}"),
        };

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (name, value) in args {
                fluent_args.set(*name, FluentValue::from(*value));
            }
            fluent_args
        });

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, fluent_args.as_ref(), &mut errors);
        if !errors.is_empty() {
            debug!(key, language, ?errors, "Message formatted with errors");
        }

        value.into_owned()
    }

    /// Get a localized message without arguments
    pub fn t(&self, key: &str, language: &str) -> String {
        self.get_message_in_language(key, language, None)
    }

    /// Get a localized message with simple string arguments
    pub fn t_args(&self, key: &str, language: &str, args: &[(&str, &str)]) -> String {
        self.get_message_in_language(key, language, Some(args))
    }
}

/// Pick the catalog for a Telegram language code
pub fn detect_language(language_code: Option<&str>) -> &'static str {
    match language_code {
        Some(code) if code.to_ascii_lowercase().starts_with("en") => "en",
        _ => DEFAULT_LANGUAGE,
    }
}
