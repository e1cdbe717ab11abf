//! Text Chunking Module
//!
//! 코퍼스 텍스트를 임베딩 단위의 청크로 분할합니다.
//!
//! 분할 규칙 (결정적):
//! 1. 남은 텍스트가 `chunk_size` 문자 이하이면 그대로 마지막 청크
//! 2. 아니면 `chunk_size` 문자 윈도우의 끝부분(허용 구간) 안에서
//!    문단(`\n\n`) > 줄바꿈 > 문장 끝 > 공백 순으로 마지막 경계를 찾음
//! 3. 허용 구간 안에 경계가 없으면 `chunk_size` 위치에서 자름
//!
//! 구분자는 앞 청크에 포함되므로 모든 청크를 이어 붙이면 원문과 같습니다.
//! 길이 단위는 바이트가 아닌 `char`입니다 (벵골어 등 다중 바이트 문자).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::RagError;

/// 문장 끝 + 공백 (영어 마침표류와 벵골어 দাঁড়ি)
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[.!?।][)"'\]]*\s"#).expect("sentence regex is valid")
});

// ============================================================================
// Chunk
// ============================================================================

/// 불변 청크 (텍스트 외의 식별자 없음)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    text: String,
}

impl Chunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// 문자 수
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<Chunk>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// TextSplitter
// ============================================================================

/// 경계 인식 고정 크기 분할기
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    tolerance: usize,
}

impl TextSplitter {
    /// 생성 (허용 구간 = `chunk_size`의 1/4)
    ///
    /// # Arguments
    /// * `chunk_size` - 청크 최대 문자 수 (1 이상)
    pub fn new(chunk_size: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::InvalidInput(
                "chunk_size must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            chunk_size,
            tolerance: chunk_size / 4,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 청크 이터레이터 (clone으로 재시작 가능)
    pub fn split<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks {
            rest: text,
            chunk_size: self.chunk_size,
            min_chars: self.chunk_size - self.tolerance,
        }
    }
}

impl Chunker for TextSplitter {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        self.split(text).map(Chunk::new).collect()
    }

    fn name(&self) -> &'static str {
        "TextSplitter"
    }
}

/// `split(text, chunk_size)` 편의 함수
pub fn split(text: &str, chunk_size: usize) -> Result<Vec<Chunk>, RagError> {
    Ok(TextSplitter::new(chunk_size)?.chunk(text))
}

// ============================================================================
// Chunks Iterator
// ============================================================================

/// 원문을 빌려 쓰는 청크 이터레이터
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    rest: &'a str,
    chunk_size: usize,
    min_chars: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }

        let Some(limit) = char_offset(self.rest, self.chunk_size) else {
            let last = self.rest;
            self.rest = "";
            return Some(last);
        };

        let window = &self.rest[..limit];
        let min_cut = char_offset(window, self.min_chars).unwrap_or(limit);
        let cut = find_break(window, min_cut).unwrap_or(limit);

        let (head, tail) = self.rest.split_at(cut);
        self.rest = tail;
        Some(head)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// `n`번째 문자의 바이트 위치 (문자가 `n`개 이하이면 None)
fn char_offset(s: &str, n: usize) -> Option<usize> {
    s.char_indices().nth(n).map(|(i, _)| i)
}

/// 윈도우 안에서 `min_cut` 이상인 가장 좋은 분할 위치 (바이트)
fn find_break(window: &str, min_cut: usize) -> Option<usize> {
    let accept = |cut: usize| (cut >= min_cut && cut > 0).then_some(cut);

    if let Some(cut) = window.rfind("\n\n").and_then(|p| accept(p + 2)) {
        return Some(cut);
    }

    if let Some(cut) = window.rfind('\n').and_then(|p| accept(p + 1)) {
        return Some(cut);
    }

    if let Some(cut) = SENTENCE_END
        .find_iter(window)
        .last()
        .and_then(|m| accept(m.end()))
    {
        return Some(cut);
    }

    window
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .and_then(|(p, c)| accept(p + c.len_utf8()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(text: &str, chunk_size: usize) {
        let chunks = split(text, chunk_size).unwrap();
        for chunk in &chunks {
            assert!(!chunk.text().is_empty(), "empty chunk");
            assert!(
                chunk.char_len() <= chunk_size,
                "chunk of {} chars exceeds {}",
                chunk.char_len(),
                chunk_size
            );
        }
        let joined: String = chunks.iter().map(Chunk::text).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn test_empty_input() {
        assert!(split("", 10).unwrap().is_empty());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(TextSplitter::new(0).is_err());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split("Venue A: Dhaka", 512).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text(), "Venue A: Dhaka");
    }

    #[test]
    fn test_size_bound_and_round_trip() {
        let text = "=== VENUE DIRECTORY ===\nVENUE: Grand Hall\nAddress: Gulshan 2, Dhaka\n\n\
                    Capacity 200 guests. Price ৳50000 per day! Parking available?\n\
                    VENDOR: Bright Photos\nServices:\n- Wedding: ৳20000-40000\n\n\
                    নিবন্ধন করুন। তারপর বুক করুন। Done.";
        for size in [1, 2, 3, 7, 16, 33, 64, 100, 1000] {
            assert_invariants(text, size);
        }
    }

    #[test]
    fn test_no_whitespace_hard_cut() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunks = split(text, 10).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text(), "abcdefghij");
        assert_eq!(chunks[2].text(), "uvwxyz");
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let text = "First paragraph here.\n\nSecond one starts now and goes on";
        let chunks = split(text, 28).unwrap();
        assert_eq!(chunks[0].text(), "First paragraph here.\n\n");
    }

    #[test]
    fn test_prefers_sentence_over_word() {
        // 허용 구간 (17자 이후) 안의 문장 끝
        let text = "Hall has 200 seats. Parking is free";
        let chunks = split(text, 22).unwrap();
        assert_eq!(chunks[0].text(), "Hall has 200 seats. ");
    }

    #[test]
    fn test_word_break_when_no_sentence() {
        let text = "capacity two hundred guests";
        let chunks = split(text, 16).unwrap();
        assert_eq!(chunks[0].text(), "capacity two ");
        assert_invariants(text, 16);
    }

    #[test]
    fn test_break_outside_tolerance_ignored() {
        // 공백이 허용 구간보다 앞에 있으면 크기 위치에서 자름
        let text = "ab cdefghijklmnopqrstuvwxyz";
        let chunks = split(text, 12).unwrap();
        assert_eq!(chunks[0].char_len(), 12);
    }

    #[test]
    fn test_multibyte_counts_chars() {
        let text = "৳৳৳৳৳৳৳৳৳৳";
        let chunks = split(text, 4).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].char_len(), 4);
        assert_invariants(text, 4);
    }

    #[test]
    fn test_iterator_is_restartable() {
        let splitter = TextSplitter::new(8).unwrap();
        let iter = splitter.split("one two three four five");
        let first: Vec<&str> = iter.clone().collect();
        let second: Vec<&str> = iter.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_deterministic() {
        let text = "Venue A. Venue B.\nVenue C\n\nVenue D";
        assert_eq!(split(text, 9).unwrap(), split(text, 9).unwrap());
    }
}
