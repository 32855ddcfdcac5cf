//! Image naming.
//!
//! Images of an app are tagged `APP:N` with an increasing integer `N`,
//! optionally followed by a suffix (`APP:N_commit`).

use tracing::warn;

use crate::cpln::ImageRecord;

/// Placeholder tag when an app has no images yet.
pub const NO_IMAGE_AVAILABLE: &str = "NO_IMAGE_AVAILABLE";

/// The integer after the `:` of an image name, 0 if there is none.
///
/// `None` when the number is too large to be followed by another image.
pub fn image_number(name: &str) -> Option<u64> {
    let Some((_, tag)) = name.split_once(':') else {
        return Some(0);
    };
    let digits: String = tag.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Some(0);
    }
    digits.parse::<u64>().ok().filter(|number| number.checked_add(1).is_some())
}

/// Whether `name` is an image of `app`.
pub fn belongs_to(name: &str, app: &str) -> bool {
    name.strip_prefix(app)
        .is_some_and(|rest| rest.starts_with(':'))
}

/// The image of `app` with the highest number.
pub fn latest_image<'a>(app: &str, images: &'a [ImageRecord]) -> Option<&'a ImageRecord> {
    images
        .iter()
        .filter(|image| belongs_to(&image.name, app))
        .filter_map(|image| match image_number(&image.name) {
            Some(number) => Some((number, image)),
            None => {
                warn!(image = %image.name, "image number out of range, ignoring");
                None
            }
        })
        .max_by_key(|(number, _)| *number)
        .map(|(_, image)| image)
}

/// Name of the latest image, or `APP:NO_IMAGE_AVAILABLE`.
pub fn latest_image_name(app: &str, images: &[ImageRecord]) -> String {
    latest_image(app, images)
        .map(|image| image.name.clone())
        .unwrap_or_else(|| format!("{app}:{NO_IMAGE_AVAILABLE}"))
}

/// Name for the next image to build.
pub fn next_image_name(app: &str, images: &[ImageRecord]) -> String {
    let latest = latest_image(app, images)
        .and_then(|image| image_number(&image.name))
        .unwrap_or(0);
    format!("{app}:{}", latest + 1)
}
