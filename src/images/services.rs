use lazy_static::lazy_static;
use regex::Regex;

use crate::ai::request::InputError;

pub(crate) fn is_image_mime(content_type: &str) -> bool {
    lazy_static! {
        static ref IMAGE_MIME_RE: Regex = Regex::new(r"^image/[a-z0-9][a-z0-9.+-]*$").unwrap();
    }
    IMAGE_MIME_RE.is_match(content_type)
}

/// Client-side checks on an uploaded photo, run before any request is built.
pub fn validate_image(content_type: &str, size: usize, max_bytes: usize) -> Result<(), InputError> {
    if !is_image_mime(content_type) {
        return Err(InputError::NotAnImage(content_type.to_string()));
    }
    if size == 0 {
        return Err(InputError::UnreadableImage("file is empty".into()));
    }
    if size > max_bytes {
        return Err(InputError::TooLarge {
            size,
            max: max_bytes,
        });
    }
    Ok(())
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}
