#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetLanguage {
    pub code: String,
    pub deepl: String,
    pub label: String,
}

const KNOWN: &[(&str, &str, &str)] = &[
    ("pt", "PT-BR", "Portuguese (Brazil)"),
    ("en", "EN-US", "English"),
    ("es", "ES", "Spanish"),
    ("fr", "FR", "French"),
    ("ja", "JA", "Japanese"),
];

/// `pt_BR` / `pt-br` → `pt`.
pub fn base_code(code: &str) -> String {
    code.trim()
        .split(['_', '-'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

pub fn lookup(code: &str) -> TargetLanguage {
    let mut base = base_code(code);
    if base.is_empty() {
        base = "en".to_string();
    }
    if let Some((c, deepl, label)) = KNOWN.iter().find(|(c, _, _)| *c == base) {
        return TargetLanguage {
            code: (*c).to_string(),
            deepl: (*deepl).to_string(),
            label: (*label).to_string(),
        };
    }
    let mut label = String::new();
    let mut chars = base.chars();
    if let Some(first) = chars.next() {
        label.extend(first.to_uppercase());
        label.push_str(chars.as_str());
    }
    TargetLanguage {
        deepl: base.to_ascii_uppercase(),
        label,
        code: base,
    }
}

#[cfg(test)]
mod tests {
    use super::lookup;

    #[test]
    fn known_and_unknown_codes() {
        let pt = lookup("pt_BR");
        assert_eq!(pt.code, "pt");
        assert_eq!(pt.deepl, "PT-BR");
        assert_eq!(pt.label, "Portuguese (Brazil)");

        let de = lookup("de");
        assert_eq!(de.deepl, "DE");
        assert_eq!(de.label, "De");

        assert_eq!(lookup("  ").code, "en");
    }
}
