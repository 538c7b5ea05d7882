use super::*;
use Color as C;

fn mkimage<const W: usize, const H: usize>(data: [[Color; W]; H]) -> Image {
    let mut image = Image::new(W as u32, H as u32);
    for (y, row) in data.iter().enumerate() {
        for (x, color) in row.iter().enumerate() {
            image.set(x as u32, y as u32, *color);
        }
    }
    image
}

#[test]
fn view_clipping() {
    let image = mkimage([
        [C::BLUE, C::WHITE, C::WHITE],
        [C::WHITE, C::RED, C::WHITE],
        [C::WHITE, C::WHITE, C::GREEN],
    ]);

    let full = image.as_view();
    assert_eq!(full.resolution(), Resolution::new(3, 3));

    let center = image.view(Rect::from_top_left(1, 1, 1, 1));
    assert_eq!(center.get(0, 0), C::RED);

    let top_left = image.view(Rect::from_top_left(-1, -1, 2, 2));
    assert_eq!(top_left.image_rect(), Rect::from_top_left(0, 0, 1, 1));
    assert_eq!(top_left.get(0, 0), C::BLUE);

    let bottom_right = image.view(Rect::from_top_left(1, 1, 10, 10));
    assert_eq!(bottom_right.image_rect(), Rect::from_top_left(1, 1, 2, 2));
    assert_eq!(bottom_right.get(1, 1), C::GREEN);

    let nested = bottom_right.view(Rect::from_top_left(1, 1, 5, 5));
    assert_eq!(nested.image_rect(), Rect::from_top_left(2, 2, 1, 1));
    assert_eq!(nested.get(0, 0), C::GREEN);

    let outside = image.view(Rect::from_top_left(5, 5, 2, 2));
    assert_eq!(outside.resolution(), Resolution::new(0, 0));
}

#[test]
fn view_to_image() {
    let image = mkimage([[C::RED, C::GREEN], [C::BLUE, C::WHITE]]);
    let copy = image.view(Rect::from_top_left(0, 1, 2, 1)).to_image();
    assert_eq!(copy.resolution(), Resolution::new(2, 1));
    assert_eq!(copy.get(0, 0), C::BLUE);
    assert_eq!(copy.get(1, 0), C::WHITE);
}

#[test]
fn from_rgb8() {
    let image = Image::from_rgb8((2, 1), &[1, 2, 3, 4, 5, 6]);
    assert_eq!(image.get(0, 0), Color::from_rgb8(1, 2, 3));
    assert_eq!(image.get(1, 0), Color::from_rgb8(4, 5, 6));
    assert_eq!(image.get(1, 0).a(), 255);
}

#[test]
fn split_channels() {
    let image = Image::filled((4, 2), Color::from_rgb8(10, 20, 30));
    let [r, g, b] = image.as_view().split();
    assert!(r.data().iter().all(|&v| v == 10));
    assert!(g.data().iter().all(|&v| v == 20));
    assert!(b.data().iter().all(|&v| v == 30));
    assert_eq!(b.resolution(), Resolution::new(4, 2));
}

#[test]
fn luma() {
    assert_eq!(C::BLACK.luma(), 0);
    assert_eq!(C::WHITE.luma(), 255);
    let gray = Color::from_rgb8(77, 77, 77);
    assert_eq!(gray.luma(), 77);
    assert!(C::GREEN.luma() > C::RED.luma());
    assert!(C::RED.luma() > C::BLUE.luma());
}

#[test]
fn threshold_is_inverted_and_strict() {
    let plane = GrayImage::from_raw((4, 1), vec![0, 139, 140, 255]).unwrap();
    let out = plane.threshold_binary_inv(140);
    assert_eq!(out.data(), &[255, 255, 0, 0]);
}

#[test]
fn scale_rounds_dimensions() {
    let plane = GrayImage::new((640, 480));
    let scaled = plane.scale(0.23, Interpolation::Cubic);
    assert_eq!(scaled.resolution(), Resolution::new(147, 110));

    let tiny = GrayImage::new((2, 2)).scale(0.23, Interpolation::Cubic);
    assert_eq!(tiny.resolution(), Resolution::new(1, 1));
}

#[test]
fn resize_preserves_uniform_planes() {
    let plane = GrayImage::from_fn((30, 20), |_, _| 255);
    for interp in [
        Interpolation::Nearest,
        Interpolation::Linear,
        Interpolation::Cubic,
    ] {
        let out = plane.resize((48, 48), interp);
        assert_eq!(out.resolution(), Resolution::new(48, 48));
        assert!(out.data().iter().all(|&v| v == 255), "{interp:?}");
    }
}

#[test]
fn draw_rect_outline() {
    let mut image = Image::filled((10, 10), C::BLACK);
    draw::rect(&mut image, Rect::from_top_left(2, 2, 5, 5)).color(C::GREEN);
    assert_eq!(image.get(2, 2), C::GREEN);
    assert_eq!(image.get(6, 6), C::GREEN);
    assert_eq!(image.get(4, 4), C::BLACK);
    assert_eq!(image.get(0, 0), C::BLACK);
}

#[test]
fn draw_clips_to_image() {
    let mut image = Image::filled((4, 4), C::BLACK);
    draw::rect(&mut image, Rect::from_top_left(-10, -10, 12, 12));
    draw::text(&mut image, 100, 100, "out of frame");
    assert_eq!(image.get(1, 1), C::RED);
    assert_eq!(image.get(3, 3), C::BLACK);
}

#[test]
fn save_and_load_png() {
    let dir = std::env::temp_dir().join(format!("handsign-image-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("roundtrip.png");

    let image = mkimage([[C::RED, C::GREEN], [C::BLUE, C::WHITE]]);
    image.save(&path).unwrap();
    let loaded = Image::load(&path).unwrap();
    assert_eq!(loaded, image);

    assert!(Image::load(dir.join("frame.bmp")).is_err());
    std::fs::remove_dir_all(&dir).unwrap();
}
