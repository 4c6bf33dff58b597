//! Identifier splitting for flag names, argument labels and column headers

/// Split an identifier on word boundaries.
///
/// Separators (`_`, `-`, space) split, as do lower-to-upper transitions
/// (`diskSize`) and the end of an acronym (`IPAddress` -> `IP`, `Address`).
/// Digits stay attached to the preceding word.
pub(crate) fn split_words(ident: &str) -> Vec<String> {
    let chars: Vec<char> = ident.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }

        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// `security_groups` -> `security-groups`
pub(crate) fn kebab_case(ident: &str) -> String {
    split_words(ident)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// `instance_type` -> `INSTANCE-TYPE`
pub(crate) fn upper_kebab_case(ident: &str) -> String {
    kebab_case(ident).to_uppercase()
}

/// `creation_date` -> `Creation Date`
pub(crate) fn title_case(ident: &str) -> String {
    split_words(ident)
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
