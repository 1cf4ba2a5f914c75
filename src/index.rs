// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Record index sidecar files.
//!
//! An index lists one record per line as `frame;device_time;arrival;offset`
//! without a header, letting a capture be sliced without rescanning it.

use crate::record::RadarRecord;
use std::{
    fmt,
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// Malformed line, `line` counts from one.
    Parse { line: usize, message: String },
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Parse { line, message } => write!(f, "index line {}: {}", line, message),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexRow {
    pub frame_index: u32,
    /// Device timestamp as carried in the record header.
    pub device_time: u64,
    /// Host arrival time [ns].
    pub arrival_time: i64,
    /// Byte offset of the record in the capture.
    pub offset: usize,
}

impl From<&RadarRecord> for IndexRow {
    fn from(record: &RadarRecord) -> IndexRow {
        IndexRow {
            frame_index: record.index,
            device_time: record.timestamp,
            arrival_time: record.arrival_time,
            offset: record.offset,
        }
    }
}

impl IndexRow {
    fn parse(line: &str, number: usize) -> Result<IndexRow, Error> {
        let fields: Vec<&str> = line.split(';').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(Error::Parse {
                line: number,
                message: format!("expected 4 fields, found {}", fields.len()),
            });
        }

        fn field<T: std::str::FromStr>(value: &str, name: &str, line: usize) -> Result<T, Error>
        where
            T::Err: fmt::Display,
        {
            value.parse().map_err(|err| Error::Parse {
                line,
                message: format!("{} {:?}: {}", name, value, err),
            })
        }

        Ok(IndexRow {
            frame_index: field(fields[0], "frame index", number)?,
            device_time: field(fields[1], "device time", number)?,
            arrival_time: field(fields[2], "arrival time", number)?,
            offset: field(fields[3], "offset", number)?,
        })
    }
}

impl fmt::Display for IndexRow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{};{};{};{}",
            self.frame_index, self.device_time, self.arrival_time, self.offset
        )
    }
}

/// Sidecar index path of a capture: `<stem>_index.csv` next to it.
pub fn index_path(capture: &Path) -> PathBuf {
    let stem = capture
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    capture.with_file_name(format!("{}_index.csv", stem))
}

/// Parses index rows, skipping blank lines.
pub fn parse<R: BufRead>(reader: R) -> Result<Vec<IndexRow>, Error> {
    let mut rows = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(IndexRow::parse(&line, i + 1)?);
    }
    Ok(rows)
}

pub fn write<W: Write>(mut writer: W, rows: &[IndexRow]) -> io::Result<()> {
    for row in rows {
        writeln!(writer, "{}", row)?;
    }
    writer.flush()
}

pub fn read_index(path: &Path) -> Result<Vec<IndexRow>, Error> {
    parse(BufReader::new(File::open(path)?))
}

pub fn write_index(path: &Path, rows: &[IndexRow]) -> Result<(), Error> {
    write(BufWriter::new(File::create(path)?), rows)?;
    Ok(())
}

/// Record offsets of the rows, in order.
pub fn offsets(rows: &[IndexRow]) -> Vec<usize> {
    rows.iter().map(|row| row.offset).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ErrorPolicy, RecordHeader, RecordReader, SYNC_WORD};

    #[test]
    fn test_index_path() {
        assert_eq!(
            index_path(Path::new("/data/run1/capture.bin")),
            PathBuf::from("/data/run1/capture_index.csv")
        );
        assert_eq!(
            index_path(Path::new("capture")),
            PathBuf::from("capture_index.csv")
        );
    }

    #[test]
    fn test_parse() {
        let text = "0;1700000000000;1700000000000123456;0\n\n1; 1700000000050 ;1700000000050654321;4280\n";
        let rows = parse(text.as_bytes()).unwrap();
        assert_eq!(
            rows,
            vec![
                IndexRow {
                    frame_index: 0,
                    device_time: 1_700_000_000_000,
                    arrival_time: 1_700_000_000_000_123_456,
                    offset: 0,
                },
                IndexRow {
                    frame_index: 1,
                    device_time: 1_700_000_000_050,
                    arrival_time: 1_700_000_000_050_654_321,
                    offset: 4280,
                },
            ]
        );

        let mut out = Vec::new();
        write(&mut out, &rows).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0;1700000000000;1700000000000123456;0\n1;1700000000050;1700000000050654321;4280\n"
        );
    }

    #[test]
    fn test_parse_errors() {
        match parse("0;1;2;3\n4;5;6\n".as_bytes()) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result {:?}", other),
        }
        match parse("0;1;x;3\n".as_bytes()) {
            Err(Error::Parse { line, message }) => {
                assert_eq!(line, 1);
                assert!(message.starts_with("arrival time"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_from_scan() {
        let mut buf = Vec::new();
        for index in 0..3u32 {
            let header = RecordHeader {
                sync_word: SYNC_WORD,
                index,
                timestamp: 1000 + index as u64,
                state: 0,
                stream_mask: 0,
                data_bytes: 0,
            };
            buf.extend_from_slice(&header.encode());
            buf.extend_from_slice(&(index as i64 * 10).to_be_bytes());
        }

        let rows: Vec<IndexRow> = RecordReader::new(&buf, ErrorPolicy::Fatal)
            .map(|record| IndexRow::from(&record.unwrap()))
            .collect();
        assert_eq!(offsets(&rows), vec![0, 32, 64]);
        assert_eq!(rows[2].device_time, 1002);
        assert_eq!(rows[2].arrival_time, 20);

        let path = std::env::temp_dir().join(format!("radarwire-index-{}.csv", std::process::id()));
        write_index(&path, &rows).unwrap();
        assert_eq!(read_index(&path).unwrap(), rows);
        std::fs::remove_file(&path).unwrap();
    }
}
