use std::{
    fs::File,
    io::{self, Read, Seek},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use crossbeam::{
    channel::{unbounded, Receiver, RecvError, SendError, Sender},
    select,
};
use notify::{event::ModifyKind, RecursiveMode, Watcher};
use thiserror::Error;
use tracing::{debug, error, warn};

/// How much of an existing file is shown when watching starts
const INITIAL_TAIL_BYTES: u64 = 64 * 1024;

/// Content appended to the watched file since the last update
#[derive(Debug, Clone)]
pub struct FileContent {
    pub content: String,
    pub is_truncated: bool,
}

/// Errors that can occur during file watching
#[derive(Debug, Error)]
pub enum FileWatcherError {
    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),
    #[error("Read error: {0}")]
    File(#[from] io::Error),
}

/// Message to control the file watcher
enum FileWatcherMessage {
    FilePath(Option<PathBuf>),
}

/// Public handle to control the file watcher
pub struct FileWatcherHandle {
    sender: Sender<FileWatcherMessage>,
    file_path: Option<PathBuf>,
}

impl FileWatcherHandle {
    pub fn new(
        content_sender: Sender<Result<FileContent, FileWatcherError>>,
        interval: Duration,
    ) -> Self {
        let (sender, receiver) = unbounded();
        let mut watcher = FileWatcher::new(content_sender, receiver, interval);

        thread::spawn(move || {
            if let Err(e) = watcher.run() {
                debug!("File watcher stopped: {}", e);
            }
        });

        Self {
            sender,
            file_path: None,
        }
    }

    /// Switch to watching another file, or stop watching with `None`
    pub fn set_file_path(&mut self, file_path: Option<PathBuf>) {
        if self.file_path != file_path {
            self.file_path = file_path.clone();
            if let Err(e) = self.sender.send(FileWatcherMessage::FilePath(file_path)) {
                error!("Failed to send file path to watcher: {}", e);
            }
        }
    }
}

/// The file watcher that runs in a background thread
struct FileWatcher {
    content_sender: Sender<Result<FileContent, FileWatcherError>>,
    receiver: Receiver<FileWatcherMessage>,
    file_path: Option<PathBuf>,
    interval: Duration,
}

impl FileWatcher {
    fn new(
        content_sender: Sender<Result<FileContent, FileWatcherError>>,
        receiver: Receiver<FileWatcherMessage>,
        interval: Duration,
    ) -> Self {
        FileWatcher {
            content_sender,
            receiver,
            file_path: None,
            interval,
        }
    }

    fn run(&mut self) -> Result<(), RecvError> {
        debug!("Starting file watcher");
        let (watch_sender, watch_receiver) = unbounded();

        let mut watcher =
            match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                if let Ok(event) = res {
                    if let notify::EventKind::Modify(ModifyKind::Data(_)) = event.kind {
                        if let Err(e) = watch_sender.send(event.paths) {
                            debug!("Error sending watch event: {}", e);
                        }
                    }
                }
            }) {
                Ok(watcher) => watcher,
                Err(e) => {
                    let _ = self.content_sender.send(Err(FileWatcherError::Watcher(e)));
                    return Ok(());
                }
            };

        // Replacing these channels drops the previous reader's ends, which
        // stops that reader thread.
        let (mut content_sender, mut content_receiver) = unbounded::<io::Result<FileContent>>();
        let (mut notify_sender, mut notify_receiver) = unbounded::<()>();

        loop {
            select! {
                recv(self.receiver) -> msg => {
                    match msg? {
                        FileWatcherMessage::FilePath(file_path) => {
                            (content_sender, content_receiver) = unbounded();
                            (notify_sender, notify_receiver) = unbounded::<()>();

                            if let Some(p) = self.file_path.take() {
                                if let Err(e) = watcher.unwatch(&p) {
                                    debug!("Failed to unwatch {}: {}", p.display(), e);
                                }
                            }

                            match file_path {
                                Some(p) => {
                                    // A job that has not started yet has no output file; the
                                    // reader's polling picks it up once it appears.
                                    if let Err(e) = watcher.watch(Path::new(&p), RecursiveMode::NonRecursive) {
                                        warn!("Cannot watch {}, polling instead: {}", p.display(), e);
                                    }
                                    self.file_path = Some(p.clone());

                                    let mut reader = FileReader::new(
                                        content_sender.clone(),
                                        notify_receiver.clone(),
                                        p.clone(),
                                        self.interval,
                                    );
                                    thread::spawn(move || reader.run());

                                    debug!("Initial read request for path: {:?}", p);
                                    let _ = notify_sender.send(());
                                }
                                None => {
                                    let content = FileContent {
                                        content: String::new(),
                                        is_truncated: false,
                                    };
                                    let _ = content_sender.send(Ok(content));
                                }
                            }
                        }
                    }
                }

                recv(watch_receiver) -> msg => {
                    if msg.is_ok() {
                        let _ = notify_sender.send(());
                    }
                }

                recv(content_receiver) -> msg => {
                    if let Ok(content_result) = msg {
                        let result = content_result.map_err(FileWatcherError::File);
                        if let Err(e) = self.content_sender.send(result) {
                            debug!("Failed to send content to app: {}", e);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Reader that reads appended file content and tracks its position
struct FileReader {
    content_sender: Sender<io::Result<FileContent>>,
    receiver: Receiver<()>,
    file_path: PathBuf,
    interval: Duration,
    pos: u64,
}

impl FileReader {
    fn new(
        content_sender: Sender<io::Result<FileContent>>,
        receiver: Receiver<()>,
        file_path: PathBuf,
        interval: Duration,
    ) -> Self {
        let pos = std::fs::metadata(&file_path)
            .map(|m| m.len().saturating_sub(INITIAL_TAIL_BYTES))
            .unwrap_or(0);

        FileReader {
            content_sender,
            receiver,
            file_path,
            interval,
            pos,
        }
    }

    fn run(&mut self) {
        loop {
            let sent = select! {
                recv(self.receiver) -> msg => match msg {
                    Ok(()) => self.update(),
                    Err(_) => return,
                },
                // Fallback polling for filesystems without change events,
                // e.g. NFS home directories
                default(self.interval) => self.update(),
            };
            if sent.is_err() {
                return;
            }
        }
    }

    fn read_new_content(&mut self) -> io::Result<FileContent> {
        let mut f = File::open(&self.file_path)?;
        let is_truncated = f.metadata()?.len() < self.pos;
        if is_truncated {
            self.pos = 0;
        }

        self.pos = f.seek(io::SeekFrom::Start(self.pos))?;
        let mut raw = Vec::new();
        self.pos += f.read_to_end(&mut raw)? as u64;

        let content = String::from_utf8_lossy(&raw).replace('\r', "");
        Ok(FileContent {
            content,
            is_truncated,
        })
    }

    fn update(&mut self) -> Result<(), SendError<io::Result<FileContent>>> {
        match self.read_new_content() {
            Ok(content) if content.content.is_empty() && !content.is_truncated => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            result => self.content_sender.send(result),
        }
    }
}
