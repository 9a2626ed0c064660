//! Readers and checks over a finished run's output

use std::path::Path;

use deal_harvester::Event;
use tokio::sync::broadcast;
use walkdir::WalkDir;

/// One persisted CSV row, reduced to the columns tests look at
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: usize,
    pub vin: String,
    pub price: String,
}

/// Read every data row of the CSV at `path`, asserting the header width.
pub fn read_rows(path: &Path) -> Vec<Row> {
    let mut reader = csv::Reader::from_path(path).expect("data file should exist");
    let headers = reader.headers().expect("header row").clone();
    assert_eq!(headers.len(), 18, "fixed 18-column schema");
    assert_eq!(&headers[0], "ID");

    reader
        .records()
        .map(|record| {
            let record = record.expect("well-formed row");
            Row {
                id: record[0].parse().expect("numeric ID"),
                vin: record[14].to_string(),
                price: record[16].to_string(),
            }
        })
        .collect()
}

/// Regular files anywhere under `root`
pub fn count_files(root: &Path) -> usize {
    if !root.exists() {
        return 0;
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}

/// Sorted file names directly inside `dir`
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("directory should exist")
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Drain whatever events are buffered without waiting
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// `(from, to)` of every WindowPersisted event, in emission order
pub fn persisted_windows(events: &[Event]) -> Vec<(usize, usize)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::WindowPersisted { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}
