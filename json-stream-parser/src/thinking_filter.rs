//! Strips `<think>...</think>` / `<|thinking|>...</|thinking|>` reasoning blocks from a
//! token stream as it arrives, and formats the surviving text as SSE frames.

use serde_json::json;

const OPEN_TAGS: [&str; 2] = ["<think>", "<|thinking|>"];
const CLOSE_TAGS: [&str; 2] = ["</think>", "</|thinking|>"];

/// Streaming thinking-tag filter. Feed it arbitrary-sized text chunks with `push`; it
/// forwards only the text outside `<think>`/`<|thinking|>` blocks, buffering partial tag
/// matches across chunk boundaries.
#[derive(Debug, Default)]
pub struct ThinkingFilter {
    pending: String,
    inside: Option<usize>,
}

impl ThinkingFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `text` through the filter, returning the portion that should be forwarded to
    /// the client immediately.
    pub fn push(&mut self, text: &str) -> String {
        let mut out = String::new();
        for c in text.chars() {
            self.pending.push(c);
            loop {
                let candidates: &[&str] = if let Some(i) = self.inside {
                    std::slice::from_ref(&CLOSE_TAGS[i])
                } else {
                    &OPEN_TAGS
                };

                if let Some(idx) = candidates.iter().position(|tag| *tag == self.pending) {
                    self.inside = match self.inside {
                        Some(_) => None,
                        // `candidates` is `OPEN_TAGS` here, so `idx` already indexes the
                        // matching close tag in the parallel `CLOSE_TAGS` array.
                        None => Some(idx),
                    };
                    self.pending.clear();
                    break;
                }

                if candidates.iter().any(|tag| tag.starts_with(&self.pending)) {
                    break;
                }

                if self.pending.chars().count() == 1 {
                    if self.inside.is_none() {
                        out.push_str(&self.pending);
                    }
                    self.pending.clear();
                    break;
                }

                let mut chars: Vec<char> = self.pending.chars().collect();
                let first = chars.remove(0);
                if self.inside.is_none() {
                    out.push(first);
                }
                self.pending = chars.into_iter().collect();
            }
        }
        out
    }

    /// Call once the stream has ended. Any buffered partial tag is dropped rather than
    /// forwarded, per the "dangling buffers are dropped" rule.
    pub fn finish(&mut self) {
        self.pending.clear();
        self.inside = None;
    }
}

/// One SSE frame in the chat-streaming contract.
#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Chunk(String),
    Done,
    Error(String),
}

impl SseFrame {
    /// Renders the frame as an `event: message` SSE payload: `data: {...}\n\n`.
    pub fn to_sse(&self) -> String {
        let body = match self {
            SseFrame::Chunk(content) => json!({"type": "chunk", "content": content, "done": false}),
            SseFrame::Done => json!({"type": "done", "content": "", "done": true}),
            SseFrame::Error(message) => {
                json!({"type": "error", "content": message, "done": true})
            }
        };
        format!("data: {body}\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwards_plain_text_unchanged() {
        let mut filter = ThinkingFilter::new();
        assert_eq!(filter.push("hola mundo"), "hola mundo");
    }

    #[test]
    fn withholds_content_inside_think_tags() {
        let mut filter = ThinkingFilter::new();
        let mut out = String::new();
        out.push_str(&filter.push("antes "));
        out.push_str(&filter.push("<think>razonamiento interno</think>"));
        out.push_str(&filter.push(" despues"));
        assert_eq!(out, "antes  despues");
    }

    #[test]
    fn withholds_content_inside_pipe_thinking_tags() {
        let mut filter = ThinkingFilter::new();
        let mut out = String::new();
        out.push_str(&filter.push("<|thinking|>oculto</|th"));
        out.push_str(&filter.push("inking|>visible"));
        assert_eq!(out, "visible");
    }

    #[test]
    fn buffers_open_tag_split_across_chunks() {
        let mut filter = ThinkingFilter::new();
        let mut out = String::new();
        out.push_str(&filter.push("ok <thi"));
        out.push_str(&filter.push("nk>secreto</think> fin"));
        assert_eq!(out, "ok  fin");
    }

    #[test]
    fn drops_dangling_partial_tag_at_stream_end() {
        let mut filter = ThinkingFilter::new();
        let out = filter.push("texto <thi");
        filter.finish();
        assert_eq!(out, "texto ");
    }

    #[test]
    fn sse_frames_serialize_with_expected_shape() {
        assert_eq!(
            SseFrame::Chunk("hola".into()).to_sse(),
            "data: {\"content\":\"hola\",\"done\":false,\"type\":\"chunk\"}\n\n"
        );
        assert_eq!(
            SseFrame::Done.to_sse(),
            "data: {\"content\":\"\",\"done\":true,\"type\":\"done\"}\n\n"
        );
    }
}
