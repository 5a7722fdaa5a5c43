//! Record source: parses the CSV catalogue into typed [`Record`]s
//!
//! The catalogue has a header row followed by data rows of exactly
//! [`FIELD_COUNT`] fields. Any row with a different field count (the header
//! included) ends the sequence with [`Error::InvalidRecord`]. Parsing is lazy:
//! rows are read one at a time as the iterator is advanced.
//!
//! Fields are raw bytes; anything that is not valid UTF-8 is replaced with
//! U+FFFD rather than rejecting the row.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::Record;

/// Number of fields every catalogue row must have
pub const FIELD_COUNT: usize = 22;

/// Column positions of the fields the pipeline uses
mod column {
    pub(super) const TITLE: usize = 0;
    pub(super) const AUTHOR: usize = 1;
    pub(super) const CONTENT_ID: usize = 7;
    pub(super) const DOI_URL: usize = 17;
    pub(super) const LANDING_PAGE_URL: usize = 18;
}

/// Lazy iterator of records read from a CSV catalogue
///
/// Yields `Err` at most once; the iterator is exhausted afterwards.
pub struct RecordReader<R: Read> {
    reader: csv::Reader<R>,
    row: csv::ByteRecord,
    row_index: usize,
    finished: bool,
}

impl RecordReader<File> {
    /// Open a catalogue file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::file(path, e))?;
        Ok(Self::new(file))
    }
}

impl<R: Read> RecordReader<R> {
    /// Wrap any reader producing CSV text
    pub fn new(reader: R) -> Self {
        // Row length is checked here rather than by the csv crate so the
        // error can carry the expected and actual counts.
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        Self {
            reader,
            row: csv::ByteRecord::new(),
            row_index: 0,
            finished: false,
        }
    }

    fn fail(&mut self, err: Error) -> Option<Result<Record>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            match self.reader.read_byte_record(&mut self.row) {
                Ok(false) => {
                    self.finished = true;
                }
                Err(source) => {
                    let row = self.row_index;
                    return self.fail(Error::Csv { row, source });
                }
                Ok(true) => {
                    let row_index = self.row_index;
                    if self.row.len() != FIELD_COUNT {
                        let found = self.row.len();
                        return self.fail(Error::InvalidRecord {
                            row: row_index,
                            expected: FIELD_COUNT,
                            found,
                        });
                    }
                    self.row_index += 1;
                    // Row 0 holds column names
                    if row_index == 0 {
                        continue;
                    }
                    return Some(Ok(record_from_row(&self.row)));
                }
            }
        }
        None
    }
}

fn record_from_row(row: &csv::ByteRecord) -> Record {
    let field = |index: usize| {
        String::from_utf8_lossy(row.get(index).unwrap_or_default()).into_owned()
    };
    Record {
        title: field(column::TITLE),
        author: field(column::AUTHOR),
        content_id: field(column::CONTENT_ID),
        doi_url: field(column::DOI_URL),
        landing_page_url: field(column::LANDING_PAGE_URL),
    }
}
