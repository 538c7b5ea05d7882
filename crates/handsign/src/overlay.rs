//! Visualization of cycle reports.

use handsign::pipeline::CycleReport;
use handsign_image::{draw, Color, Image};

const STATUS_POS: (i32, i32) = (70, 35);
const CLASS_POS: (i32, i32) = (30, 75);

/// Draws the tracking state described by `report` onto a copy of `frame`.
pub fn annotate(frame: &Image, report: &CycleReport) -> Image {
    let mut image = frame.clone();

    if let Some(tracked) = report.tracked {
        draw::rect(&mut image, tracked)
            .color(Color::BLUE)
            .stroke_width(2);
    }
    if let Some(window) = report.window {
        draw::rect(&mut image, window).color(Color::GREEN);
    }

    let (status, color) = match (report.tracked, report.tracking_ok) {
        (None, _) => ("Waiting for hand", Color::WHITE),
        (Some(_), true) => ("Tracking detected", Color::GREEN),
        (Some(_), false) => ("Tracking failure detected", Color::RED),
    };
    draw::text(&mut image, STATUS_POS.0, STATUS_POS.1, status)
        .align_left()
        .color(color);

    if let Some(prediction) = report.prediction {
        let text = format!(
            "Predicted class: {} ({:.0}%)",
            prediction.class_id,
            prediction.probability * 100.0
        );
        draw::text(&mut image, CLASS_POS.0, CLASS_POS.1, &text)
            .align_left()
            .color(Color::from_rgb8(50, 170, 50));
    }

    image
}

#[cfg(test)]
mod tests {
    use handsign::pipeline::{Phase, Prediction};
    use handsign_image::{Rect, Resolution};

    use super::*;

    #[test]
    fn draws_tracked_rect() {
        let frame = Image::filled(Resolution::VGA, Color::BLACK);
        let report = CycleReport {
            frame_index: 0,
            phase: Phase::Tracking,
            started: false,
            tracked: Some(Rect::from_top_left(200, 200, 50, 50)),
            confidence: Some(0.9),
            window: None,
            tracking_ok: true,
            window_valid: false,
            prediction: Some(Prediction {
                class_id: 2,
                probability: 0.5,
            }),
        };
        let image = annotate(&frame, &report);
        assert!((198..=202).any(|x| image.get(x, 220) == Color::BLUE));
        assert_eq!(image.get(225, 225), Color::BLACK);
        assert_eq!(frame.get(200, 220), Color::BLACK);
    }
}
