/// Resource fetching on a worker thread
use anyhow::Context;
use log::{debug, info};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use stlpin_core::{FetchError, LoadTicket};

/// Where a model comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Http(String),
    File(PathBuf),
}

impl Source {
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            Source::Http(location.to_string())
        } else if let Some(path) = location.strip_prefix("file://") {
            Source::File(PathBuf::from(path))
        } else {
            Source::File(PathBuf::from(location))
        }
    }
}

/// Retrieves raw STL bytes over HTTP or from disk
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::blocking::Client,
}

impl Fetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("stlpin/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self { client })
    }

    pub fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        match Source::parse(location) {
            Source::Http(url) => self.fetch_http(url),
            Source::File(path) => std::fs::read(&path).map_err(|source| FetchError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    fn fetch_http(&self, url: String) -> Result<Vec<u8>, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.clone(),
            message: e.to_string(),
        };

        let response = self.client.get(&url).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().map_err(transport)?;
        debug!("downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

/// A finished fetch, tagged with the load it belongs to
pub struct Completion {
    pub ticket: LoadTicket,
    pub result: Result<Vec<u8>, FetchError>,
}

/// Runs fetches off the event loop and hands completions back to it
pub struct Loader {
    fetcher: Fetcher,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
}

impl Loader {
    pub fn new(fetcher: Fetcher) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            fetcher,
            sender,
            receiver,
        }
    }

    /// Fetch in the background; the result arrives through `poll`
    pub fn start(&self, ticket: LoadTicket) {
        info!("fetching {}", ticket.url);
        let fetcher = self.fetcher.clone();
        let sender = self.sender.clone();
        thread::spawn(move || {
            let result = fetcher.fetch(&ticket.url);
            // The receiver is gone when the app is shutting down
            let _ = sender.send(Completion { ticket, result });
        });
    }

    /// Next finished fetch, without blocking
    pub fn poll(&self) -> Option<Completion> {
        match self.receiver.try_recv() {
            Ok(completion) => Some(completion),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_source_classification() {
        assert_eq!(
            Source::parse(" https://example.com/a.stl "),
            Source::Http("https://example.com/a.stl".into())
        );
        assert_eq!(
            Source::parse("file:///tmp/a.stl"),
            Source::File(PathBuf::from("/tmp/a.stl"))
        );
        assert_eq!(Source::parse("models/a.stl"), Source::File(PathBuf::from("models/a.stl")));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let fetcher = Fetcher::new().unwrap();
        let result = fetcher.fetch("/definitely/not/here.stl");
        assert!(matches!(result, Err(FetchError::Io { .. })));
    }

    #[test]
    fn test_loader_delivers_completion_with_ticket() {
        let path = std::env::temp_dir().join(format!("stlpin-fetch-{}.stl", std::process::id()));
        std::fs::write(&path, b"solid x\nendsolid x\n").unwrap();

        let loader = Loader::new(Fetcher::new().unwrap());
        let ticket = LoadTicket {
            generation: 7,
            url: path.display().to_string(),
        };
        loader.start(ticket.clone());

        let deadline = Instant::now() + Duration::from_secs(5);
        let completion = loop {
            if let Some(completion) = loader.poll() {
                break completion;
            }
            assert!(Instant::now() < deadline, "fetch did not complete");
            std::thread::sleep(Duration::from_millis(5));
        };

        assert_eq!(completion.ticket, ticket);
        assert_eq!(completion.result.unwrap(), b"solid x\nendsolid x\n");
        std::fs::remove_file(path).unwrap();
    }
}
