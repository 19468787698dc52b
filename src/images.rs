// Rewrites object-store image URLs into resized renditions.

use std::fmt;

const STORAGE_HOST_MARKER: &str = "supabase.co/storage";
const OBJECT_PATH: &str = "/storage/v1/object/";
const RENDER_PATH: &str = "/storage/v1/render/image/";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Resize {
    #[default]
    Cover,
    Contain,
    Fill,
}

impl fmt::Display for Resize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resize::Cover => "cover",
            Resize::Contain => "contain",
            Resize::Fill => "fill",
        })
    }
}

/// Render URL for `url` at the given size. URLs outside the object store,
/// URLs not shaped like `.../storage/v1/object/...` and URLs that already
/// carry a `width` are returned unchanged.
pub fn optimize_image(url: &str, width: u32, height: Option<u32>, quality: u8, resize: Resize) -> String {
    if !url.contains(STORAGE_HOST_MARKER) {
        return url.to_string();
    }
    if url.contains("?width=") || url.contains("&width=") {
        return url.to_string();
    }

    let mut parts = url.split(OBJECT_PATH);
    let (Some(base), Some(object), None) = (parts.next(), parts.next(), parts.next()) else {
        return url.to_string();
    };

    let mut rendered = format!("{}{}{}?width={}", base, RENDER_PATH, object, width);
    if let Some(height) = height {
        rendered.push_str(&format!("&height={}", height));
    }
    rendered.push_str(&format!("&quality={}&resize={}", quality, resize));
    rendered
}

/// One image at every preset size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsiveImage {
    pub thumbnail: String,
    pub small: String,
    pub medium: String,
    pub large: String,
    pub original: String,
}

impl ResponsiveImage {
    pub fn new(url: &str) -> Self {
        let preset = |width, height, quality| optimize_image(url, width, Some(height), quality, Resize::Cover);
        ResponsiveImage {
            thumbnail: preset(200, 150, 40),
            small: preset(400, 300, 45),
            medium: preset(800, 600, 50),
            large: preset(1200, 900, 55),
            original: url.to_string(),
        }
    }

    /// `srcset` value over the resized presets.
    pub fn srcset(&self) -> String {
        format!("{} 400w, {} 800w, {} 1200w", self.small, self.medium, self.large)
    }
}
