use crate::models::DEFAULT_SESSION_TITLE;

pub const TITLE_MAX_LEN: usize = 50;

/// How far back from the truncation point a space may be and still be used
/// as the cut point (a cut is only taken in the last 30% of the budget).
const WORD_CUT_RATIO: f32 = 0.7;

const CLAUSE_TERMINATORS: [char; 4] = ['.', '?', '!', ';'];

/// Derive a session title from free text: collapse whitespace, keep the
/// leading clause, strip trailing punctuation, truncate to `max_len`
/// preferring a word boundary. Falls back to the default placeholder when
/// nothing usable remains.
pub fn derive_title(text: &str, max_len: usize) -> String {
    let mut cleaned: String = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(pos) = cleaned.find(CLAUSE_TERMINATORS) {
        if pos > 0 {
            cleaned.truncate(pos);
        }
    }
    let cleaned = cleaned
        .trim_end_matches(CLAUSE_TERMINATORS)
        .trim()
        .to_string();

    let mut title = cleaned;
    if title.chars().count() > max_len {
        let cut: String = title.chars().take(max_len).collect();
        title = match cut.rfind(' ') {
            Some(space_idx) => {
                let chars_before = cut[..space_idx].chars().count();
                if chars_before as f32 > max_len as f32 * WORD_CUT_RATIO {
                    cut[..space_idx].to_string()
                } else {
                    cut
                }
            }
            None => cut,
        };
    }

    let title = title.trim().to_string();
    if title.is_empty() {
        DEFAULT_SESSION_TITLE.to_string()
    } else {
        title
    }
}
