use std::path::Path;

use image::{ImageError, Rgb, RgbImage};

use crate::error::{Result, TrainErr};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const MARGIN: u32 = 40;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([0, 0, 0]);
pub const TRAIN_COLOR: Rgb<u8> = Rgb([31, 119, 180]);
pub const TEST_COLOR: Rgb<u8> = Rgb([214, 39, 40]);

/// Draws the train and test loss curves over the epochs seen so far.
///
/// Both curves share the y axis, which starts at zero and ends slightly
/// above the largest finite loss. Non-finite values are skipped.
pub fn render_losses(train: &[f64], test: &[f64]) -> RgbImage {
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);

    let bottom = HEIGHT - MARGIN;
    let right = WIDTH - MARGIN;
    draw_line(&mut img, (MARGIN, MARGIN), (MARGIN, bottom), AXIS);
    draw_line(&mut img, (MARGIN, bottom), (right, bottom), AXIS);

    let top = train
        .iter()
        .chain(test)
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0f64, f64::max);
    let top = if top > 0.0 { top * 1.05 } else { 1.0 };

    let epochs = train.len().max(test.len());
    let x_step = f64::from(right - MARGIN) / epochs.saturating_sub(1).max(1) as f64;
    let y_span = f64::from(bottom - MARGIN);

    let to_pixel = |i: usize, v: f64| -> (u32, u32) {
        let x = f64::from(MARGIN) + i as f64 * x_step;
        let y = f64::from(bottom) - v.clamp(0.0, top) / top * y_span;
        (x.round() as u32, y.round() as u32)
    };

    for (values, color) in [(train, TRAIN_COLOR), (test, TEST_COLOR)] {
        let mut prev = None;
        for (i, &v) in values.iter().enumerate() {
            if !v.is_finite() {
                prev = None;
                continue;
            }

            let point = to_pixel(i, v);
            draw_marker(&mut img, point, color);
            if let Some(prev) = prev {
                draw_line(&mut img, prev, point, color);
            }
            prev = Some(point);
        }
    }

    img
}

/// Renders the loss curves and writes them to `path` as a PNG, replacing any previous plot.
pub fn save_losses(path: &Path, train: &[f64], test: &[f64]) -> Result<()> {
    render_losses(train, test)
        .save(path)
        .map_err(|e| match e {
            ImageError::IoError(source) => TrainErr::io(path, source),
            other => TrainErr::from(other),
        })
}

fn draw_marker(img: &mut RgbImage, (x, y): (u32, u32), color: Rgb<u8>) {
    for dy in 0..3 {
        for dx in 0..3 {
            put(img, i64::from(x) + dx - 1, i64::from(y) + dy - 1, color);
        }
    }
}

/// Bresenham line between two pixels.
fn draw_line(img: &mut RgbImage, from: (u32, u32), to: (u32, u32), color: Rgb<u8>) {
    let (mut x, mut y) = (i64::from(from.0), i64::from(from.1));
    let (x1, y1) = (i64::from(to.0), i64::from(to.1));

    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put(img, x, y, color);
        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) {
        if x < img.width() && y < img.height() {
            img.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(img: &RgbImage, color: Rgb<u8>) -> usize {
        img.pixels().filter(|&&p| p == color).count()
    }

    #[test]
    fn both_curves_are_drawn() {
        let img = render_losses(&[2.0, 1.5, 1.0], &[2.2, 1.8, 1.6]);

        assert_eq!(img.dimensions(), (WIDTH, HEIGHT));
        assert!(count(&img, TRAIN_COLOR) > 0);
        assert!(count(&img, TEST_COLOR) > 0);
    }

    #[test]
    fn a_single_epoch_still_gets_a_marker() {
        let img = render_losses(&[0.7], &[0.9]);
        assert_eq!(count(&img, TRAIN_COLOR), 9);
    }

    #[test]
    fn non_finite_losses_are_skipped() {
        let img = render_losses(&[f64::NAN, f64::INFINITY], &[]);
        assert_eq!(count(&img, TRAIN_COLOR), 0);
    }

    #[test]
    fn plots_are_written_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.png");

        save_losses(&path, &[1.0, 0.5], &[1.2, 0.8]).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (WIDTH, HEIGHT));
    }
}
