//! Image-to-chromosome correlation by file name.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::Chromosome;

static IMAGE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(png|bmp|jpg)$").expect("valid regex"));

/// Whether `image` (a workspace-relative path) belongs to `chromosome`.
///
/// The file stem must end in the chromosome number with a non-digit (or
/// nothing) before it, so `x_chr1.png` matches 1 but `x_chr11.png` does not.
pub fn matches_chromosome(image: &str, chromosome: Chromosome) -> bool {
    let name = image.rsplit('/').next().unwrap_or(image);
    let Some(suffix) = IMAGE_SUFFIX_RE.find(name) else {
        return false;
    };
    let stem = &name[..suffix.start()];
    let digits = chromosome.to_string();
    match stem.strip_suffix(digits.as_str()) {
        Some(prefix) => !prefix.ends_with(|c: char| c.is_ascii_digit()),
        None => false,
    }
}

/// First image (in the given order) belonging to `chromosome`.
pub fn find_image(images: &[String], chromosome: Chromosome) -> Option<&str> {
    images
        .iter()
        .find(|image| matches_chromosome(image, chromosome))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_does_not_match_eleven() {
        let images: Vec<String> = ["sample_chr1.png", "sample_chr11.png", "sample_chr2.png"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(find_image(&images, 1), Some("sample_chr1.png"));
        assert_eq!(find_image(&images, 11), Some("sample_chr11.png"));
        assert_eq!(find_image(&images, 2), Some("sample_chr2.png"));
        assert_eq!(find_image(&images, 3), None);
    }

    #[test]
    fn suffix_match_is_case_insensitive_and_path_aware() {
        assert!(matches_chromosome("plots/x_chr7.JPG", 7));
        assert!(matches_chromosome("7.bmp", 7));
        assert!(!matches_chromosome("plots1/x_chr.png", 1));
        assert!(!matches_chromosome("x_chr17.png", 7));
        assert!(!matches_chromosome("x_chr7.txt", 7));
    }

    #[test]
    fn first_match_in_order_wins() {
        let images = vec!["a_chr4.png".to_string(), "b_chr4.png".to_string()];
        assert_eq!(find_image(&images, 4), Some("a_chr4.png"));
    }
}
