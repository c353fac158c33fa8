use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, ImageReader};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tokio::fs;
use tracing::{debug, info};

use crate::error::PdfError;

/// Page width in points (A4).
const PAGE_WIDTH_PT: i64 = 595;

struct PageImage {
    path: PathBuf,
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
}

/// Collects JPEG page images in reading order and writes them as one PDF,
/// one image per page.
pub struct PdfBuilder {
    pages: Vec<PageImage>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub async fn add_image(&mut self, path: &Path) -> Result<(), PdfError> {
        let jpeg = fs::read(path).await.map_err(|source| PdfError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let invalid = |reason: String| PdfError::Image {
            path: path.to_path_buf(),
            reason,
        };
        let reader = ImageReader::new(Cursor::new(&jpeg))
            .with_guessed_format()
            .map_err(|e| invalid(e.to_string()))?;
        if reader.format() != Some(ImageFormat::Jpeg) {
            return Err(invalid(format!("unsupported format {:?}", reader.format())));
        }
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| invalid(e.to_string()))?;
        if width == 0 || height == 0 {
            return Err(invalid("empty image".to_string()));
        }

        debug!("Added page image {} ({}x{})", path.display(), width, height);
        self.pages.push(PageImage {
            path: path.to_path_buf(),
            jpeg,
            width,
            height,
        });
        Ok(())
    }

    pub async fn save(&self, output_path: &Path) -> Result<(), PdfError> {
        if self.pages.is_empty() {
            return Err(PdfError::Empty);
        }

        info!("Building PDF with {} pages", self.pages.len());

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(self.pages.len());

        for page in &self.pages {
            let (page_width, page_height) = page_size(page.width, page.height);

            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => i64::from(page.width),
                    "Height" => i64::from(page.height),
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                page.jpeg.clone(),
            ));

            // Scale the unit image square to the full page.
            let content = Content {
                operations: vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            page_width.into(),
                            0.into(),
                            0.into(),
                            page_height.into(),
                            0.into(),
                            0.into(),
                        ],
                    ),
                    Operation::new("Do", vec!["Im0".into()]),
                    Operation::new("Q", vec![]),
                ],
            };
            let content_bytes = content
                .encode()
                .map_err(|e| PdfError::Serialize(e.to_string()))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! {
                        "Im0" => image_id,
                    },
                },
                "MediaBox" => vec![0.into(), 0.into(), page_width.into(), page_height.into()],
            });
            debug!("Placed {} as page {}", page.path.display(), kids.len() + 1);
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut data = Vec::new();
        doc.save_to(&mut data)
            .map_err(|e| PdfError::Serialize(e.to_string()))?;

        fs::write(output_path, data)
            .await
            .map_err(|source| PdfError::Write {
                path: output_path.to_path_buf(),
                source,
            })?;

        info!(
            "Wrote {} pages to {}",
            self.pages.len(),
            output_path.display()
        );
        Ok(())
    }
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A4-wide page whose height keeps the image aspect ratio.
fn page_size(width: u32, height: u32) -> (i64, i64) {
    let page_height = (PAGE_WIDTH_PT as f64 * f64::from(height) / f64::from(width)).round() as i64;
    (PAGE_WIDTH_PT, page_height.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::{Rgb, RgbImage};

    fn write_jpeg(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 60, 30]));
        let mut buf = Vec::new();
        img.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 90))
            .unwrap();
        std::fs::write(path, buf).unwrap();
    }

    fn image_width(doc: &Document, page_id: lopdf::ObjectId) -> i64 {
        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let image_id = xobjects.get(b"Im0").unwrap().as_reference().unwrap();
        let stream = doc.get_object(image_id).unwrap().as_stream().unwrap();
        stream.dict.get(b"Width").unwrap().as_i64().unwrap()
    }

    #[test]
    fn test_page_size_keeps_aspect_ratio() {
        assert_eq!(page_size(1000, 1414), (595, 841));
        assert_eq!(page_size(200, 100), (595, 298));
    }

    #[tokio::test]
    async fn test_builds_pages_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("C1.jpg");
        let second = dir.path().join("1.jpg");
        write_jpeg(&first, 40, 60);
        write_jpeg(&second, 30, 60);

        let mut builder = PdfBuilder::new();
        builder.add_image(&first).await.unwrap();
        builder.add_image(&second).await.unwrap();
        assert_eq!(builder.page_count(), 2);

        let output = dir.path().join("book.pdf");
        builder.save(&output).await.unwrap();

        let doc = Document::load(&output).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);
        assert_eq!(image_width(&doc, pages[&1]), 40);
        assert_eq!(image_width(&doc, pages[&2]), 30);
    }

    #[tokio::test]
    async fn test_rejects_non_jpeg_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("page.png");
        RgbImage::new(4, 4).save(&png).unwrap();

        let mut builder = PdfBuilder::new();
        assert!(matches!(
            builder.add_image(&png).await,
            Err(PdfError::Image { .. })
        ));
        assert!(matches!(
            builder.add_image(&dir.path().join("nope.jpg")).await,
            Err(PdfError::Read { .. })
        ));
        assert_eq!(builder.page_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_builder_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("empty.pdf");

        assert!(matches!(
            PdfBuilder::new().save(&output).await,
            Err(PdfError::Empty)
        ));
        assert!(!output.exists());
    }
}
