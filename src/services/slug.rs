//! URL slugs for guides and therapies

/// Generate a URL-friendly slug from a title.
///
/// Lowercases, folds Spanish/Portuguese accents to ASCII, turns every other
/// character into a hyphen and collapses runs of hyphens.
/// `"Ceremonia de Cacao en Mérida"` becomes `"ceremonia-de-cacao-en-merida"`.
pub fn generate_slug(title: &str) -> String {
    let mut result = String::with_capacity(title.len());
    let mut prev_hyphen = true;

    for c in title.to_lowercase().chars() {
        let c = fold_accent(c);
        if c.is_ascii_alphanumeric() {
            result.push(c);
            prev_hyphen = false;
        } else if !prev_hyphen {
            result.push('-');
            prev_hyphen = true;
        }
    }

    while result.ends_with('-') {
        result.pop();
    }
    result
}

/// Pick a free slug of at most `max_len` characters.
///
/// Tries `base`, then `base-2`, `base-3`, ... until `taken` reports the
/// candidate as free. The base is cut short so the suffix always fits.
/// An empty base becomes `fallback`. An all-digit base is prefixed with
/// `{fallback}-` so the slug can never be mistaken for a numeric id.
pub async fn unique_slug<F, Fut>(
    base: &str,
    fallback: &str,
    max_len: usize,
    mut taken: F,
) -> anyhow::Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<bool>>,
{
    let base = if base.is_empty() {
        fallback.to_string()
    } else if base.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}", fallback, base)
    } else {
        base.to_string()
    };

    let mut n = 1u32;
    loop {
        let suffix = if n == 1 { String::new() } else { format!("-{}", n) };
        let candidate = format!("{}{}", truncate(&base, max_len.saturating_sub(suffix.len())), suffix);
        if !taken(candidate.clone()).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Cut a slug to `max_len` bytes without leaving a trailing hyphen.
/// Slugs are ASCII, so byte and character counts agree.
fn truncate(slug: &str, max_len: usize) -> &str {
    let end = slug
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&end| end <= max_len)
        .last()
        .unwrap_or(0);
    slug[..end].trim_end_matches('-')
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        _ => c,
    }
}
