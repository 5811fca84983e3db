//! Components F and G: the two delay-line flavours that move samples
//! between the audio thread and worker threads (spec §4.F, §4.G, §5).

pub mod single_reader;
pub mod synchronized;

pub use single_reader::{SingleReaderDelayLine, WriteReadyListener};
pub use synchronized::{spawn_worker, SynchronizedDelayLine};
