//! Text helpers shared by the provider parsers.

/// Compose a program title from a series title and a content/episode title.
///
/// Both present and different: `"{series}: {content}"`. Equal or only one
/// present: whichever exists.
pub fn compose_title(series: &str, content: &str) -> String {
    let series = series.trim();
    let content = content.trim();

    if !content.is_empty() && !series.is_empty() && series != content {
        return format!("{series}: {content}");
    }
    if !content.is_empty() {
        return content.to_string();
    }
    series.to_string()
}

/// Derive a URL slug from a channel display name: lowercase, a few common
/// non-ASCII letters folded, everything else collapsed to single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;

    for ch in name.to_lowercase().chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' => Some(ch),
            'ä' | 'å' | 'á' | 'à' | 'â' => Some('a'),
            'ö' | 'ó' | 'ò' | 'ô' => Some('o'),
            'é' | 'è' | 'ê' | 'ë' => Some('e'),
            'ü' | 'ú' | 'ù' => Some('u'),
            _ => None,
        };

        match mapped {
            Some(c) => {
                slug.push(c);
                last_dash = false;
            }
            None if !last_dash => {
                slug.push('-');
                last_dash = true;
            }
            None => {}
        }
    }

    slug.trim_end_matches('-').to_string()
}
