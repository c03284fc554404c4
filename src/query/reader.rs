//! Line-oriented reader of query files.
//!
//! Each line is one query, either a JSON object or `id:text`. The
//! format is detected on the first line by attempting JSON and falling
//! back to the colon format; the verdict is remembered for the rest of
//! the stream.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;

use super::QueryContainer;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Colon,
}

type MapFn = Box<dyn Fn(QueryContainer) -> QueryContainer>;
type FilterFn = Box<dyn Fn(&QueryContainer) -> bool>;

/// Reads [`QueryContainer`]s from a file or standard input.
pub struct QueryReader {
    input: Box<dyn BufRead>,
    format: Option<Format>,
    map_functions: Vec<MapFn>,
    filter_functions: Vec<FilterFn>,
}

impl QueryReader {
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(Box::new(BufReader::new(File::open(path)?))))
    }

    pub fn from_stdin() -> Self {
        Self::new(Box::new(BufReader::new(std::io::stdin())))
    }

    /// Reads from any buffered source; handy for tests.
    pub fn new(input: Box<dyn BufRead>) -> Self {
        Self {
            input,
            format: None,
            map_functions: Vec::new(),
            filter_functions: Vec::new(),
        }
    }

    /// Applies `f` to every query produced by the reader.
    pub fn map(mut self, f: impl Fn(QueryContainer) -> QueryContainer + 'static) -> Self {
        self.map_functions.push(Box::new(f));
        self
    }

    /// Registers a predicate over produced queries.
    pub fn filter(mut self, f: impl Fn(&QueryContainer) -> bool + 'static) -> Self {
        self.filter_functions.push(Box::new(f));
        self
    }

    fn next_query(&mut self) -> Result<Option<QueryContainer>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(['\n', '\r']);
        match self.format {
            Some(Format::Json) => QueryContainer::from_json(line).map(Some),
            Some(Format::Colon) => Ok(Some(QueryContainer::from_colon_format(line))),
            None => match QueryContainer::from_json(line) {
                Ok(query) => {
                    self.format = Some(Format::Json);
                    Ok(Some(query))
                }
                Err(err) => {
                    debug!("line is not JSON ({err}), switching to the colon format");
                    self.format = Some(Format::Colon);
                    Ok(Some(QueryContainer::from_colon_format(line)))
                }
            },
        }
    }

    /// Produces the next query, or `None` at end of input.
    pub fn next(&mut self) -> Result<Option<QueryContainer>> {
        let Some(mut container) = self.next_query()? else {
            return Ok(None);
        };
        // Filter verdicts are computed but do not drop the query (kept
        // for compatibility; see DESIGN.md).
        for filter in &self.filter_functions {
            let _ = filter(&container);
        }
        for map in &self.map_functions {
            container = map(container);
        }
        Ok(Some(container))
    }
}
