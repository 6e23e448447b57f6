//! Languages a channel can be set to.

/// A supported language and the codes DeepL expects for it.
///
/// `deepl_source`/`deepl_target` are `None` when DeepL cannot translate from
/// or into the language; other providers work from `name`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub deepl_source: Option<&'static str>,
    pub deepl_target: Option<&'static str>,
}

const fn deepl(
    code: &'static str,
    name: &'static str,
    source: &'static str,
    target: &'static str,
) -> Language {
    Language {
        code,
        name,
        deepl_source: Some(source),
        deepl_target: Some(target),
    }
}

const fn other(code: &'static str, name: &'static str) -> Language {
    Language {
        code,
        name,
        deepl_source: None,
        deepl_target: None,
    }
}

pub static LANGUAGES: &[Language] = &[
    deepl("ar", "Arabic", "AR", "AR"),
    deepl("bg", "Bulgarian", "BG", "BG"),
    deepl("cs", "Czech", "CS", "CS"),
    deepl("da", "Danish", "DA", "DA"),
    deepl("de", "German", "DE", "DE"),
    deepl("el", "Greek", "EL", "EL"),
    deepl("en", "English", "EN", "EN-US"),
    deepl("en-gb", "English (British)", "EN", "EN-GB"),
    deepl("es", "Spanish", "ES", "ES"),
    deepl("et", "Estonian", "ET", "ET"),
    deepl("fi", "Finnish", "FI", "FI"),
    deepl("fr", "French", "FR", "FR"),
    other("hi", "Hindi"),
    deepl("hu", "Hungarian", "HU", "HU"),
    deepl("id", "Indonesian", "ID", "ID"),
    deepl("it", "Italian", "IT", "IT"),
    deepl("ja", "Japanese", "JA", "JA"),
    deepl("ko", "Korean", "KO", "KO"),
    deepl("lt", "Lithuanian", "LT", "LT"),
    deepl("lv", "Latvian", "LV", "LV"),
    deepl("nb", "Norwegian", "NB", "NB"),
    deepl("nl", "Dutch", "NL", "NL"),
    deepl("pl", "Polish", "PL", "PL"),
    deepl("pt", "Portuguese", "PT", "PT-PT"),
    deepl("pt-br", "Portuguese (Brazilian)", "PT", "PT-BR"),
    deepl("ro", "Romanian", "RO", "RO"),
    deepl("ru", "Russian", "RU", "RU"),
    deepl("sk", "Slovak", "SK", "SK"),
    deepl("sl", "Slovenian", "SL", "SL"),
    deepl("sv", "Swedish", "SV", "SV"),
    other("th", "Thai"),
    other("tl", "Tagalog"),
    deepl("tr", "Turkish", "TR", "TR"),
    deepl("uk", "Ukrainian", "UK", "UK"),
    other("vi", "Vietnamese"),
    deepl("zh", "Chinese (simplified)", "ZH", "ZH-HANS"),
    deepl("zh-hant", "Chinese (traditional)", "ZH", "ZH-HANT"),
];

pub fn by_code(code: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|l| l.code.eq_ignore_ascii_case(code))
}

/// Exact name or code match, case-insensitive.
pub fn resolve(input: &str) -> Option<&'static Language> {
    let input = input.trim();
    LANGUAGES
        .iter()
        .find(|l| l.name.eq_ignore_ascii_case(input))
        .or_else(|| by_code(input))
}

/// Autocomplete choices: names starting with `prefix`, at most `limit`.
pub fn search(prefix: &str, limit: usize) -> Vec<&'static Language> {
    let prefix = prefix.trim().to_lowercase();
    LANGUAGES
        .iter()
        .filter(|l| l.name.to_lowercase().starts_with(&prefix))
        .take(limit)
        .collect()
}
