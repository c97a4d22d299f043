//! Synchronous checks run before any call to the store.

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::types::models::Profile;

pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;
pub const PHOTO_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
pub const MAX_LISTING_PHOTOS: usize = 8;
pub const MAX_COMMENT_PHOTOS: usize = 3;

const BUY_TAGS: [&str; 2] = ["#wtb", "#wanttobuy"];
const SELL_TAGS: [&str; 2] = ["#wts", "#wanttosell"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeKind {
    Buying,
    Selling,
}

/// Checks the hashtag convention every listing follows and returns which
/// kind of listing it is.
///
/// A listing names its intent with a whitespace-delimited trade tag,
/// selling listings carry at least one photo, and there is at least one
/// word besides hashtags.
pub fn check_listing_content(content: &str, photo_count: usize) -> AppResult<TradeKind> {
    let words: Vec<String> = content.split_whitespace().map(str::to_lowercase).collect();
    let has = |tags: &[&str]| words.iter().any(|w| tags.contains(&w.as_str()));

    let selling = has(&SELL_TAGS[..]);
    let buying = has(&BUY_TAGS[..]);
    if !selling && !buying {
        return Err(AppError::new(
            ErrorCode::MissingTradeTag,
            "please include either #wtb, #wts, #wanttobuy, or #wanttosell",
        ));
    }

    if selling && photo_count == 0 {
        return Err(AppError::new(
            ErrorCode::PhotoRequiredForSale,
            "please include at least 1 photo for #wts posts",
        ));
    }

    if words.iter().all(|w| w.starts_with('#')) {
        return Err(AppError::new(ErrorCode::ContentRequired, "please include content in your post"));
    }

    Ok(if selling { TradeKind::Selling } else { TradeKind::Buying })
}

pub fn check_comment_text(text: &str) -> AppResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::new(ErrorCode::EmptyComment, "comment is empty"));
    }
    Ok(trimmed)
}

pub fn require_display_name(profile: Option<&Profile>) -> AppResult<()> {
    match profile.and_then(Profile::display_name) {
        Some(_) => Ok(()),
        None => Err(AppError::new(
            ErrorCode::DisplayNameRequired,
            "set a display name on your profile first",
        )),
    }
}

pub fn check_photo_count(count: usize, limit: usize) -> AppResult<()> {
    if count > limit {
        return Err(AppError::new(
            ErrorCode::TooManyPhotos,
            format!("you can only upload a maximum of {limit} photos"),
        ));
    }
    Ok(())
}

/// Extension-derived content type of an acceptable photo.
pub fn check_photo(file_name: &str, size: usize) -> AppResult<&'static str> {
    if size > MAX_PHOTO_BYTES {
        return Err(AppError::new(
            ErrorCode::PhotoTooLarge,
            "file size exceeds the limit (5 MB), please upload a smaller file",
        ));
    }

    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        _ => Err(AppError::new(
            ErrorCode::PhotoTypeInvalid,
            format!("invalid file type, accepted: {}", PHOTO_EXTENSIONS.join(", ")),
        )),
    }
}
