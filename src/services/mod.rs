pub mod chunker;
pub mod fetcher;
pub mod interpreter;
pub mod renderer;
pub mod segmenter;
pub mod splitter;

pub use chunker::Rechunker;
pub use fetcher::SourceReader;
pub use interpreter::TableInterpreter;
pub use renderer::HttpPageRenderer;
pub use segmenter::Segmenter;
pub use splitter::HeaderSplitter;
