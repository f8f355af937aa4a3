use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// How many decoded records may sit between the reader task and the
/// consumer before the reader blocks.
const RECORD_STREAM_CAPACITY: usize = 32;

/// Errors terminating a record stream.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The underlying CSV data could not be decoded.
    #[error("failed to read csv record")]
    Csv(#[from] csv::Error),
    /// The reader task went away before producing a header.
    #[error("record source closed before the header arrived")]
    HeaderUnavailable,
}

#[derive(Debug)]
struct HeaderIndex {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl HeaderIndex {
    fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, index }
    }

    fn len(&self) -> usize {
        self.names.len()
    }
}

/// One data row, with fields keyed by the values of the header row.
#[derive(Debug, Clone)]
pub struct Record {
    header: Arc<HeaderIndex>,
    fields: Vec<String>,
}

impl Record {
    fn new(header: Arc<HeaderIndex>, fields: Vec<String>) -> Self {
        Self { header, fields }
    }

    /// The header this record was decoded under.
    pub fn header(&self) -> &[String] {
        &self.header.names
    }

    /// The value of the field under `key`, or the empty string if the
    /// column does not exist or the row was too narrow to fill it.
    pub fn get(&self, key: &str) -> &str {
        match self.header.index.get(key) {
            Some(&i) if i < self.fields.len() => &self.fields[i],
            _ => "",
        }
    }
}

/// A lazy, single-pass stream of [`Record`]s decoded from a CSV input
/// whose first row is the header.
///
/// Decoding runs on a blocking task; records arrive over a bounded channel
/// so an unread file never sits fully in memory. The stream ends on EOF or
/// on the first decoding error; [`CsvSource::error`] reports the terminal
/// cause once the stream has been drained.
pub struct CsvSource {
    header: Arc<HeaderIndex>,
    records: mpsc::Receiver<Record>,
    error: Arc<Mutex<Option<SourceError>>>,
}

impl CsvSource {
    /// Start decoding `input`, returning once the header row has been read.
    pub async fn open<R: Read + Send + 'static>(input: R) -> Result<Self, SourceError> {
        let (header_tx, header_rx) = oneshot::channel();
        let (record_tx, record_rx) = mpsc::channel(RECORD_STREAM_CAPACITY);
        let error = Arc::new(Mutex::new(None));

        let error_slot = error.clone();
        tokio::task::spawn_blocking(move || read_records(input, header_tx, record_tx, error_slot));

        let header = header_rx
            .await
            .map_err(|_| SourceError::HeaderUnavailable)??;
        Ok(Self {
            header,
            records: record_rx,
            error,
        })
    }

    /// The header row.
    pub fn header(&self) -> &[String] {
        &self.header.names
    }

    /// The next record, or `None` once the stream is exhausted or closed.
    pub async fn next_record(&mut self) -> Option<Record> {
        self.records.recv().await
    }

    /// Stop the stream early. The reader task exits on its next send; any
    /// records still in flight are dropped.
    pub fn close(&mut self) {
        self.records.close();
    }

    /// The error that terminated the stream, if any. Meaningful only after
    /// [`CsvSource::next_record`] has returned `None`; a clean EOF leaves
    /// this empty.
    pub fn error(&self) -> Option<SourceError> {
        self.error.lock().expect("source error slot poisoned").take()
    }
}

fn read_records<R: Read>(
    input: R,
    header_tx: oneshot::Sender<Result<Arc<HeaderIndex>, SourceError>>,
    record_tx: mpsc::Sender<Record>,
    error: Arc<Mutex<Option<SourceError>>>,
) {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);

    let header = match reader.headers() {
        Ok(row) => Arc::new(HeaderIndex::new(row.iter().map(str::to_string).collect())),
        Err(err) => {
            let _ = header_tx.send(Err(err.into()));
            return;
        }
    };
    if header_tx.send(Ok(header.clone())).is_err() {
        return;
    }

    let mut row = csv::StringRecord::new();
    loop {
        match reader.read_record(&mut row) {
            Ok(true) => {
                let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
                if fields.len() > header.len() {
                    warn!(
                        header_width = header.len(),
                        record_width = fields.len(),
                        "truncating over-wide record to header width"
                    );
                    fields.truncate(header.len());
                }
                if record_tx
                    .blocking_send(Record::new(header.clone(), fields))
                    .is_err()
                {
                    // Consumer hung up; stop reading.
                    return;
                }
            }
            Ok(false) => return,
            Err(err) => {
                *error.lock().expect("source error slot poisoned") = Some(err.into());
                return;
            }
        }
    }
}
