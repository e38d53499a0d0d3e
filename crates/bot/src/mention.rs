//! Rich-text markers in group messages: quoted replies and @-mentions.

use std::{borrow::Cow, ops::Range, sync::LazyLock};

use {regex::Regex, tracing::warn};

static REPLY_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[CQ:reply,id=-?\d+\]").ok());

/// Remove quoted-reply markers (`[CQ:reply,id=123]`). The quoted message id
/// must never be read as a mention or as command text.
pub fn strip_reply_markers(text: &str) -> Cow<'_, str> {
    match REPLY_MARKER.as_ref() {
        Some(re) => re.replace_all(text, ""),
        None => Cow::Borrowed(text),
    }
}

/// The bot's own identifier, learned from inbound traffic, plus the matcher
/// for mentions of it.
#[derive(Debug, Clone)]
pub struct SelfIdentity {
    id: String,
    mention: Option<Regex>,
}

impl SelfIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let escaped = regex::escape(&id);
        let pattern = format!(r"\[CQ:at,qq={escaped}(?:,[^\]]*)?\]|@{escaped}");
        let mention = match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(self_id = %id, error = %e, "cannot build mention matcher, using plain markers");
                None
            },
        };
        Self { id, mention }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Is the bot addressed by an at-marker or a plain `@<id>`?
    pub fn is_mentioned(&self, text: &str) -> bool {
        !self.mention_spans(text).is_empty()
    }

    /// Remove every mention of the bot and trim the rest.
    pub fn strip_mentions(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for span in self.mention_spans(text) {
            out.push_str(&text[last..span.start]);
            last = span.end;
        }
        out.push_str(&text[last..]);
        out.trim().to_string()
    }

    /// Byte ranges of mentions, in order. A plain `@<id>` followed by another
    /// digit addresses someone else (`@1234567` is not `@123456`).
    fn mention_spans(&self, text: &str) -> Vec<Range<usize>> {
        let candidates: Vec<Range<usize>> = match &self.mention {
            Some(re) => re.find_iter(text).map(|m| m.range()).collect(),
            None => {
                let mut spans: Vec<Range<usize>> = self
                    .plain_markers()
                    .iter()
                    .flat_map(|marker| {
                        text.match_indices(marker.as_str())
                            .map(|(start, m)| start..start + m.len())
                    })
                    .collect();
                spans.sort_by_key(|span| span.start);
                spans
            },
        };
        candidates
            .into_iter()
            .filter(|span| {
                !(text[span.clone()].starts_with('@')
                    && text[span.end..].starts_with(|c: char| c.is_ascii_digit()))
            })
            .collect()
    }

    fn plain_markers(&self) -> [String; 2] {
        [format!("[CQ:at,qq={}]", self.id), format!("@{}", self.id)]
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("[CQ:reply,id=1321]hello", "hello")]
    #[case("[CQ:reply,id=-5][CQ:at,qq=1] x", "[CQ:at,qq=1] x")]
    #[case("no markers", "no markers")]
    fn reply_markers_are_removed(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_reply_markers(input), expected);
    }

    #[rstest]
    #[case("[CQ:at,qq=123456] download 1", true)]
    #[case("[CQ:at,qq=123456,name=bot] download 1", true)]
    #[case("@123456 download 1", true)]
    #[case("[CQ:at,qq=654321] download 1", false)]
    #[case("download 123456", false)]
    #[case("@1234567 漫画列表", false)]
    #[case("@123456漫画列表", true)]
    #[case("[CQ:at,qq=1234567] 漫画列表", false)]
    #[case("", false)]
    fn mention_detection(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(SelfIdentity::new("123456").is_mentioned(text), expected);
    }

    #[test]
    fn stripping_leaves_command_text() {
        let me = SelfIdentity::new("123456");
        assert_eq!(me.strip_mentions("[CQ:at,qq=123456] download 1"), "download 1");
        assert_eq!(me.strip_mentions(" @123456  发送 7 "), "发送 7");
        assert_eq!(
            me.strip_mentions("[CQ:at,qq=123456,name=x] [CQ:at,qq=999] hi"),
            "[CQ:at,qq=999] hi"
        );
    }

    #[test]
    fn longer_id_is_left_alone() {
        let me = SelfIdentity::new("123456");
        assert_eq!(
            me.strip_mentions("@1234567 @123456 漫画列表"),
            "@1234567  漫画列表"
        );
    }

    #[test]
    fn reply_marker_is_not_a_mention() {
        let me = SelfIdentity::new("1321");
        let text = strip_reply_markers("[CQ:reply,id=1321] list");
        assert!(!me.is_mentioned(&text));
    }
}
