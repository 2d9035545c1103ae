//! Small utility helpers used across modules.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::domain::ImageInput;
use crate::error::AppError;

/// Very small and safe string templating.
/// Replaces `{key}` with the matching value in a single pass; substituted values are
/// never rescanned, so user text containing `{code}` stays literal. Unknown keys are kept.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let hit = after.find('}').and_then(|close| {
      let key = &after[..close];
      pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| (close, *v))
    });
    match hit {
      Some((close, value)) => {
        out.push_str(value);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// `value` unless it is blank, in which case `placeholder`.
pub fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
  if value.trim().is_empty() { placeholder } else { value }
}

/// Decode an uploaded image. Accepts a `data:<mime>;base64,<payload>` URL, or a bare
/// base64 payload together with its MIME type.
pub fn parse_image(payload: &str, mime: Option<&str>) -> Result<ImageInput, AppError> {
  let invalid = || AppError::Extraction("Invalid image data.".into());

  let (mime, data) = match payload.trim().strip_prefix("data:") {
    Some(rest) => {
      let (header, data) = rest.split_once(',').ok_or_else(invalid)?;
      let mime = header.strip_suffix(";base64").ok_or_else(invalid)?;
      (mime.to_string(), data)
    }
    None => {
      let mime = mime
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AppError::Extraction("Image MIME type is missing.".into()))?;
      (mime.to_string(), payload)
    }
  };

  if !mime.starts_with("image/") {
    return Err(AppError::Extraction(format!("Unsupported file type: {mime}")));
  }
  let data = data.trim();
  if data.is_empty() {
    return Err(invalid());
  }
  let bytes = STANDARD
    .decode(data)
    .map_err(|e| AppError::Extraction(format!("Invalid image data: {e}")))?;
  Ok(ImageInput { bytes, mime })
}

/// Re-encode an image as a data URL for the model API.
pub fn image_data_url(image: &ImageInput) -> String {
  format!("data:{};base64,{}", image.mime, STANDARD.encode(&image.bytes))
}

/// Append transcribed text to whatever the user already typed.
pub fn merge_extracted(current: &str, extracted: &str) -> String {
  if current.trim().is_empty() {
    extracted.to_string()
  } else {
    format!("{current}\n\n--- From Image ---\n{extracted}")
  }
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
