use std::io::{BufRead, Lines};

use crate::error::{LearnError, Result, RowError, Stream};

/// One line of a feature file: `song,timestamp,v0,v1,...`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Empty when the row continues the previous song.
    pub song_id: String,
    pub timestamp: f64,
    pub vector: Vec<f64>,
}

impl FeatureRow {
    pub fn parse(line: &str) -> Result<Self, RowError> {
        let mut fields = line.split(',');
        let song_id = fields.next().unwrap_or_default().to_string();
        let timestamp = fields
            .next()
            .ok_or(RowError::MissingField("timestamp"))
            .and_then(|text| parse_field(1, text))?;
        let vector = fields
            .enumerate()
            .map(|(index, text)| parse_field(index + 2, text))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            song_id,
            timestamp,
            vector,
        })
    }

    pub fn starts_song(&self) -> bool {
        !self.song_id.is_empty()
    }
}

fn parse_field(field: usize, text: &str) -> Result<f64, RowError> {
    text.trim()
        .parse()
        .map_err(|source| RowError::NotNumeric {
            field,
            text: text.to_string(),
            source,
        })
}

/// Parses a feature file line by line.
pub struct FeatureReader<R> {
    lines: Lines<R>,
    stream: Stream,
    line: usize,
}

impl<R: BufRead> FeatureReader<R> {
    pub fn new(reader: R, stream: Stream) -> Self {
        Self {
            lines: reader.lines(),
            stream,
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for FeatureReader<R> {
    type Item = Result<FeatureRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let stream = self.stream;
        let text = match self.lines.next()? {
            Ok(text) => text,
            Err(source) => return Some(Err(LearnError::Io { stream, source })),
        };
        self.line += 1;

        let line = self.line;
        Some(FeatureRow::parse(&text).map_err(|source| LearnError::Parse {
            stream,
            line,
            source,
        }))
    }
}
