//! Synthetic frames shared by unit tests.

use std::sync::OnceLock;

use handsign_image::{Color, Image, Resolution};

/// Smooth, non-repeating intensity pattern. Every neighborhood looks different, which gives the
/// tracker something to lock on to.
fn texture(x: f32, y: f32) -> Color {
    let v = 128.0
        + 45.0 * (x * 0.11 + 0.7 * (y * 0.05).sin()).sin()
        + 35.0 * (y * 0.13 + x * 0.031).cos()
        + 25.0 * ((x - y) * 0.07).sin() * (x * 0.017).cos();
    let v = v.clamp(0.0, 255.0);
    Color::from_rgb8(v as u8, (v * 0.8 + 20.0) as u8, (255.0 - v) as u8)
}

/// A 640x480 textured frame.
pub fn textured_frame() -> &'static Image {
    static IMG: OnceLock<Image> = OnceLock::new();
    IMG.get_or_init(|| shifted_frame(0, 0))
}

/// A 640x480 frame of uniform gray. Every patch looks the same.
pub fn flat_frame() -> Image {
    Image::filled(Resolution::VGA, Color::from_rgb8(90, 90, 90))
}

/// The textured frame with its content moved by `(dx, dy)` pixels.
pub fn shifted_frame(dx: i32, dy: i32) -> Image {
    Image::from_fn(Resolution::VGA, |x, y| {
        texture((x as i32 - dx) as f32, (y as i32 - dy) as f32)
    })
}
