//! Catalogue and landing page fixtures

use std::path::Path;
use std::time::Duration;
use textbook_dl::source::FIELD_COUNT;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Render one catalogue row; columns the reader ignores are left empty
pub fn catalogue_row(
    title: &str,
    author: &str,
    content_id: &str,
    landing_page_url: &str,
) -> String {
    let mut fields = vec![String::new(); FIELD_COUNT];
    fields[0] = title.to_string();
    fields[1] = author.to_string();
    fields[7] = content_id.to_string();
    fields[17] = format!("http://doi.org/{}", content_id);
    fields[18] = landing_page_url.to_string();

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(&fields)
        .expect("Failed to render catalogue row");
    let bytes = writer.into_inner().expect("Failed to flush catalogue row");
    String::from_utf8(bytes).expect("Catalogue row is not UTF-8")
}

/// Header row with [`FIELD_COUNT`] column names
pub fn catalogue_header() -> String {
    let names: Vec<String> = (0..FIELD_COUNT).map(|i| format!("Column {}", i)).collect();
    format!("{}\n", names.join(","))
}

/// A book served by the mock publisher
pub struct Book {
    /// Title column
    pub title: &'static str,
    /// Content identifier column
    pub content_id: &'static str,
    /// Landing page path on the mock server
    pub landing_path: String,
}

impl Book {
    /// Book whose landing page lives at `/book/<content_id>`
    pub fn new(title: &'static str, content_id: &'static str) -> Self {
        Self {
            title,
            content_id,
            landing_path: format!("/book/{}", content_id),
        }
    }

    /// Catalogue row pointing at this book's landing page on `server`
    pub fn row(&self, server: &MockServer) -> String {
        catalogue_row(
            self.title,
            "Test Author",
            self.content_id,
            &format!("{}{}", server.uri(), self.landing_path),
        )
    }
}

/// Landing page HTML with a single download link
///
/// The link line sits between ordinary markup lines, one element per line.
pub fn landing_page_html(link: &str, format_name: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Book</title></head>\n<body>\n\
         <a href=\"{link}\" title=\"Download this book in {format_name} format\">{format_name}</a>\n\
         </body>\n</html>\n"
    )
}

/// Landing page HTML without any download link
pub const BARE_LANDING_PAGE: &str = "<!DOCTYPE html>\n<html>\n<body>\n<p>Not available</p>\n</body>\n</html>\n";

/// Mount a landing page linking to `/content/<id>.pdf` and the content itself
pub async fn mount_pdf_book(server: &MockServer, book: &Book, content: Vec<u8>) {
    let link = format!("/content/{}.pdf", book.content_id);
    Mock::given(method("GET"))
        .and(path(book.landing_path.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_page_html(&link, "PDF")))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(link))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content))
        .mount(server)
        .await;
}

/// Mount a landing page with no download link, answering after `delay`
pub async fn mount_unresolvable_book(server: &MockServer, book: &Book, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(book.landing_path.clone()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(BARE_LANDING_PAGE)
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Write a catalogue with a header and the given rows
pub fn write_catalogue(path: &Path, rows: &[String]) {
    let mut text = catalogue_header();
    for row in rows {
        text.push_str(row);
    }
    std::fs::write(path, text).expect("Failed to write catalogue");
}

/// Deterministic binary content of `len` bytes
pub fn generate_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
