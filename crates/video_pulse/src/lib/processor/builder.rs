use std::path::PathBuf;

use job_datastore::DataStore;

use crate::{
    processor::{ChunkingConfig, JobProcessor},
    yt::AudioHandler,
    Summarizer, Transcriber,
};

/// Assembles a [`JobProcessor`]. `build` only becomes available once every
/// collaborator has been supplied.
pub struct JobProcessorBuilder<D = (), A = (), T = (), S = ()> {
    workdir: PathBuf,
    store: D,
    audio_handler: A,
    transcriber: T,
    summarizer: S,
    chunking_config: Option<ChunkingConfig>,
}

impl JobProcessorBuilder {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            store: (),
            audio_handler: (),
            transcriber: (),
            summarizer: (),
            chunking_config: None,
        }
    }
}

impl<D, A, T, S> JobProcessorBuilder<D, A, T, S> {
    pub fn store<D2: DataStore + Send + Sync + 'static>(
        self,
        store: D2,
    ) -> JobProcessorBuilder<D2, A, T, S> {
        JobProcessorBuilder {
            workdir: self.workdir,
            store,
            audio_handler: self.audio_handler,
            transcriber: self.transcriber,
            summarizer: self.summarizer,
            chunking_config: self.chunking_config,
        }
    }

    pub fn audio_handler<A2: AudioHandler + Send + Sync + 'static>(
        self,
        audio_handler: A2,
    ) -> JobProcessorBuilder<D, A2, T, S> {
        JobProcessorBuilder {
            workdir: self.workdir,
            store: self.store,
            audio_handler,
            transcriber: self.transcriber,
            summarizer: self.summarizer,
            chunking_config: self.chunking_config,
        }
    }

    pub fn transcriber<T2: Transcriber + Send + Sync + 'static>(
        self,
        transcriber: T2,
    ) -> JobProcessorBuilder<D, A, T2, S> {
        JobProcessorBuilder {
            workdir: self.workdir,
            store: self.store,
            audio_handler: self.audio_handler,
            transcriber,
            summarizer: self.summarizer,
            chunking_config: self.chunking_config,
        }
    }

    pub fn summarizer<S2: Summarizer + Send + Sync + 'static>(
        self,
        summarizer: S2,
    ) -> JobProcessorBuilder<D, A, T, S2> {
        JobProcessorBuilder {
            workdir: self.workdir,
            store: self.store,
            audio_handler: self.audio_handler,
            transcriber: self.transcriber,
            summarizer,
            chunking_config: self.chunking_config,
        }
    }

    /// Split downloaded audio into `chunk_duration_seconds` pieces before
    /// transcription.
    pub fn with_chunking(mut self, chunk_duration_seconds: u16) -> Self {
        self.chunking_config = Some(ChunkingConfig {
            chunk_duration_seconds,
        });
        self
    }
}

impl<D, A, T, S> JobProcessorBuilder<D, A, T, S>
where
    D: DataStore + Send + Sync + 'static,
    A: AudioHandler + Send + Sync + 'static,
    T: Transcriber + Send + Sync + 'static,
    S: Summarizer + Send + Sync + 'static,
{
    pub fn build(self) -> JobProcessor<D, A, T, S> {
        JobProcessor {
            workdir: self.workdir,
            store: self.store,
            audio_handler: self.audio_handler,
            transcriber: self.transcriber,
            summarizer: self.summarizer,
            chunking_config: self.chunking_config,
        }
    }
}
