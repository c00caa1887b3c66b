extern crate pneumo_detect;

use image::{DynamicImage, ImageBuffer, Luma};
use pneumo_detect::pipeline::{ImageLoader, Preprocessor};

mod stubs;

fn assert_model_input(tensor: &pneumo_detect::common::InputTensor) {
    assert_eq!(tensor.shape(), &[1, 512, 512, 1]);
    let (min, max) = tensor
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    assert!(min >= 0.0 && max <= 1.0, "values in {min}..{max}");
}

#[test]
fn random_non_square_image_becomes_model_input() {
    let image = stubs::random_image(600, 400);
    let tensor = Preprocessor::default().preprocess(&image).unwrap();
    assert_model_input(&tensor);
}

#[test]
fn uniform_gray_image_becomes_model_input() {
    let image = stubs::gray_image(100, 100, 128);
    let tensor = Preprocessor::default().preprocess(&image).unwrap();
    assert_model_input(&tensor);

    // Equalization of a flat image stays flat.
    let first = tensor[[0, 0, 0, 0]];
    assert!(tensor.iter().all(|&v| v == first));
}

#[test]
fn sixteen_bit_input_is_accepted() {
    let wide: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(320, 1024, |x, y| Luma([((x * 97 + y * 31) % 65535) as u16]));
    let image = ImageLoader::from_dynamic(DynamicImage::ImageLuma16(wide)).unwrap();

    let tensor = Preprocessor::default().preprocess(&image).unwrap();
    assert_model_input(&tensor);
}

#[test]
fn preprocessing_is_deterministic() {
    let image = stubs::random_image(257, 131);
    let preprocessor = Preprocessor::default();
    assert_eq!(
        preprocessor.preprocess(&image).unwrap(),
        preprocessor.preprocess(&image).unwrap()
    );
}

#[test]
fn tiny_image_is_upscaled() {
    let image = stubs::gray_image(1, 1, 3);
    let tensor = Preprocessor::default().preprocess(&image).unwrap();
    assert_model_input(&tensor);
}
