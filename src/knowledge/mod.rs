//! Knowledge 모듈 - 코퍼스 저장과 검색
//!
//! - Chunker: 경계 인식 고정 크기 분할
//! - Vector: 인메모리 선형 스캔 코사인 검색
//! - Directory: 섹션 단위 코퍼스 문서 (장소/업체 목록)
//! - Store: SQLite 영구 저장소 (원문, 벡터 스냅샷, 장소/업체)

mod chunker;
mod directory;
mod store;
mod vector;

// Re-exports
pub use chunker::{split, Chunk, Chunker, Chunks, TextSplitter};
pub use directory::{
    CorpusDocument, Review, Section, SectionBody, Vendor, VendorService, Venue, GUIDE_SECTION,
    VENDOR_SECTION, VENUE_SECTION,
};
pub use store::{fingerprint, DocumentStore, SnapshotWrite, SqliteDocumentStore, StoreStats};
pub(crate) use vector::validate_dimensions;
pub use vector::{cosine_similarity, InMemoryVectorStore, SearchResult, VectorRecord, VectorStore};
