use crate::detector::Detection;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

pub const PERSON_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const FACE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

const LINE_WIDTH: u32 = 2;

/// Copy of `image` with person boxes in green and face boxes in blue
pub fn annotate(image: &RgbImage, persons: &[Detection], faces: &[Detection]) -> RgbImage {
    let mut canvas = image.clone();
    for detection in persons {
        draw_box(&mut canvas, detection, PERSON_COLOR);
    }
    for detection in faces {
        draw_box(&mut canvas, detection, FACE_COLOR);
    }
    canvas
}

fn draw_box(canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
    let [x1, y1, x2, y2] = detection.bbox;
    for inset in 0..LINE_WIDTH {
        let width = (x2 - x1).saturating_sub(2 * inset);
        let height = (y2 - y1).saturating_sub(2 * inset);
        if width == 0 || height == 0 {
            break;
        }
        let rect = Rect::at((x1 + inset) as i32, (y1 + inset) as i32).of_size(width, height);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectionClass;

    #[test]
    fn test_boxes_drawn_in_class_colours() {
        let image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        let person = Detection::new([10, 10, 50, 90], 0.9, DetectionClass::Person, (100, 100)).unwrap();
        let face = Detection::new([60, 10, 80, 30], 0.8, DetectionClass::Face, (100, 100)).unwrap();

        let output = annotate(&image, &[person], &[face]);
        assert_eq!(output.get_pixel(10, 50), &PERSON_COLOR);
        assert_eq!(output.get_pixel(11, 50), &PERSON_COLOR);
        assert_eq!(output.get_pixel(30, 50), &Rgb([0, 0, 0]));
        assert_eq!(output.get_pixel(70, 10), &FACE_COLOR);
        assert_eq!(image.get_pixel(10, 50), &Rgb([0, 0, 0]));
    }
}
