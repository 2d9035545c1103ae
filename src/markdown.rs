//! Segmenter for model replies: turns a Markdown-ish blob into typed display blocks.
//!
//! Two stages:
//!   1) `tokenize` walks the text line by line. At each line start it first tries a
//!      fenced block (which may span many lines), then the markers in `LINE_MARKERS`
//!      in table order. Anything else accumulates into a plain run.
//!   2) `segment` maps tokens to `ContentBlock`s in one linear pass; plain runs are
//!      split into `**emphasis**` spans.
//!
//! Only a small subset of Markdown is recognized. Unknown syntax is never an error,
//! it simply stays paragraph text. A fence that is never closed does not open a block.

use serde::Serialize;

const FENCE: &str = "```";
const EMPHASIS: &str = "**";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LineKind {
  Heading2,
  Heading1,
  ListItem,
}

/// Line-start markers, highest precedence first. Fences are tried before all of these.
const LINE_MARKERS: &[(&str, LineKind)] = &[
  ("## ", LineKind::Heading2),
  ("# ", LineKind::Heading1),
  ("* ", LineKind::ListItem),
];

/// Flat token stream produced by `tokenize`. Slices borrow from the input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token<'a> {
  /// Everything between the opening and closing backtick markers.
  Fence(&'a str),
  Heading { level: u8, text: &'a str },
  ListItem(&'a str),
  Plain(&'a str),
}

/// One renderable unit of a model reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
  Heading { level: u8, text: String },
  ListItem { text: String },
  Paragraph { spans: Vec<Span> },
  CodeBlock {
    /// Possibly empty; the front-end falls back to "plaintext" for highlighting.
    #[serde(rename = "languageTag")]
    language_tag: String,
    code: String,
  },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Span {
  PlainText { text: String },
  Emphasized { text: String },
}

/// Split `content` into marker tokens and plain runs, in input order.
///
/// Heading and list lines consume their line terminator. A closing fence consumes
/// the rest of its line when that rest is blank; otherwise the rest starts a plain run.
pub fn tokenize(content: &str) -> Vec<Token<'_>> {
  let mut tokens = Vec::new();
  let mut plain_start = 0;
  let mut pos = 0;

  while pos < content.len() {
    let line_end = line_end(content, pos);
    let line = &content[pos..line_end];
    let marker_at = pos + (line.len() - line.trim_start_matches(|c: char| c == ' ' || c == '\t').len());

    let matched = match_fence(content, marker_at)
      .or_else(|| match_line_marker(content, marker_at, line_end));

    match matched {
      Some((token, next)) => {
        push_plain(&mut tokens, &content[plain_start..pos]);
        tokens.push(token);
        pos = next;
        plain_start = next;
      }
      None => pos = next_line(content, line_end),
    }
  }

  push_plain(&mut tokens, &content[plain_start..]);
  tokens
}

/// Segment a reply into display blocks. Total: never fails, never drops text.
///
/// Input without any marker becomes exactly one `Paragraph`, including the empty string.
/// Whitespace-only runs between markers still produce their own (blank) `Paragraph`.
pub fn segment(content: &str) -> Vec<ContentBlock> {
  let tokens = tokenize(content);
  if tokens.is_empty() {
    return vec![ContentBlock::Paragraph { spans: Vec::new() }];
  }
  tokens.into_iter().map(ContentBlock::from).collect()
}

/// Split paragraph text on paired `**` delimiters. An unpaired `**` stays plain text.
pub fn split_emphasis(text: &str) -> Vec<Span> {
  let mut spans = Vec::new();
  let mut rest = text;

  while let Some(open) = rest.find(EMPHASIS) {
    let inner_start = open + EMPHASIS.len();
    let Some(inner_len) = rest[inner_start..].find(EMPHASIS) else {
      break;
    };
    if open > 0 {
      spans.push(Span::PlainText { text: rest[..open].to_string() });
    }
    spans.push(Span::Emphasized {
      text: rest[inner_start..inner_start + inner_len].to_string(),
    });
    rest = &rest[inner_start + inner_len + EMPHASIS.len()..];
  }

  if !rest.is_empty() {
    spans.push(Span::PlainText { text: rest.to_string() });
  }
  spans
}

/// Code of the first fenced block, if the reply had one.
pub fn first_code_block(blocks: &[ContentBlock]) -> Option<&str> {
  blocks.iter().find_map(|b| match b {
    ContentBlock::CodeBlock { code, .. } => Some(code.as_str()),
    _ => None,
  })
}

impl From<Token<'_>> for ContentBlock {
  fn from(token: Token<'_>) -> Self {
    match token {
      Token::Fence(inner) => {
        // First line is the info string; a one-line fence has a tag and no code.
        let (info, code) = inner.split_once('\n').unwrap_or((inner, ""));
        ContentBlock::CodeBlock {
          language_tag: info.trim().to_string(),
          code: code.trim().to_string(),
        }
      }
      Token::Heading { level, text } => ContentBlock::Heading { level, text: text.to_string() },
      Token::ListItem(text) => ContentBlock::ListItem { text: text.to_string() },
      Token::Plain(text) => ContentBlock::Paragraph { spans: split_emphasis(text) },
    }
  }
}

fn match_fence(content: &str, at: usize) -> Option<(Token<'_>, usize)> {
  if !content[at..].starts_with(FENCE) {
    return None;
  }
  let open_end = at + FENCE.len();
  // Non-greedy: the first marker after the opening one closes the block.
  let close = open_end + content[open_end..].find(FENCE)?;
  let after = close + FENCE.len();

  let tail_end = line_end(content, after);
  let next = if content[after..tail_end].trim().is_empty() {
    next_line(content, tail_end)
  } else {
    after
  };
  Some((Token::Fence(&content[open_end..close]), next))
}

fn match_line_marker(content: &str, at: usize, line_end: usize) -> Option<(Token<'_>, usize)> {
  let rest = &content[at..line_end];
  let (marker, kind) = LINE_MARKERS.iter().find(|(m, _)| rest.starts_with(m))?;
  let text = rest[marker.len()..].trim_end_matches('\r');

  let token = match kind {
    LineKind::Heading2 => Token::Heading { level: 2, text },
    LineKind::Heading1 => Token::Heading { level: 1, text },
    LineKind::ListItem => Token::ListItem(text),
  };
  Some((token, next_line(content, line_end)))
}

fn push_plain<'a>(tokens: &mut Vec<Token<'a>>, text: &'a str) {
  if !text.is_empty() {
    tokens.push(Token::Plain(text));
  }
}

fn line_end(content: &str, from: usize) -> usize {
  content[from..].find('\n').map_or(content.len(), |i| from + i)
}

fn next_line(content: &str, line_end: usize) -> usize {
  if line_end < content.len() { line_end + 1 } else { line_end }
}
