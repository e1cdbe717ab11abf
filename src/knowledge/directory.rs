//! 코퍼스 문서 모델 - 섹션 단위 구조화
//!
//! 코퍼스 원문은 `=== TITLE ===` 헤더 줄로 구분된 섹션들입니다.
//! 장소(VENUE DIRECTORY)와 업체(VENDOR DIRECTORY) 섹션은 타입이 있는
//! 레코드 목록으로 다루고, 나머지 섹션은 원문 그대로 보존합니다.
//! 텍스트로의 직렬화는 저장/청킹 직전에만 합니다.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// 장소 목록 섹션 제목
pub const VENUE_SECTION: &str = "VENUE DIRECTORY";
/// 업체 목록 섹션 제목
pub const VENDOR_SECTION: &str = "VENDOR DIRECTORY";
/// 디렉토리 섹션이 없을 때 이 섹션 앞에 삽입
pub const GUIDE_SECTION: &str = "PLATFORM USAGE GUIDE";

// ============================================================================
// Directory Records
// ============================================================================

/// 장소 리뷰
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub rating: f32,
}

/// 장소 레코드
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    #[serde(default)]
    pub venue_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, rename = "eventType")]
    pub event_types: Vec<String>,
    #[serde(default)]
    pub ratings: Option<f32>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub contact: String,
}

/// 업체 서비스 (행사 종류별 가격대)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorService {
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub price_range: String,
}

/// 업체 레코드
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub ratings: Option<f32>,
    #[serde(default)]
    pub services: Vec<VendorService>,
}

impl Venue {
    /// 코퍼스 텍스트 형식
    pub fn render(&self) -> String {
        let event_types = self.event_types.join(", ");
        let mut out = String::new();
        let _ = writeln!(out, "VENUE: {}", self.venue_name);
        let _ = writeln!(out, "Address: {}", self.address);
        let _ = writeln!(out, "Location: {}", self.location);
        let _ = writeln!(out, "Event Types: {}", event_types);
        let _ = writeln!(out, "Rating: {}/5", format_rating(self.ratings));
        out.push_str("Reviews:\n");
        for review in &self.reviews {
            let _ = writeln!(
                out,
                "- {}: '{}' ({}/5)",
                review.user, review.comment, review.rating
            );
        }
        let _ = writeln!(out, "Contact: {}", self.contact);
        out
    }
}

impl Vendor {
    /// 코퍼스 텍스트 형식
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "VENDOR: {}", self.company_name);
        let _ = writeln!(out, "Role: {}", self.role);
        let _ = writeln!(out, "Email: {}", self.email);
        let _ = writeln!(out, "Phone: {}", self.phone);
        let _ = writeln!(out, "Rating: {}/5", format_rating(self.ratings));
        out.push_str("Services:\n");
        for service in &self.services {
            let _ = writeln!(out, "- {}: ৳{}", service.event_type, service.price_range);
        }
        out
    }
}

fn format_rating(rating: Option<f32>) -> String {
    rating.map(|r| r.to_string()).unwrap_or_default()
}

// ============================================================================
// Corpus Document
// ============================================================================

/// 섹션 내용
#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    /// 원문 그대로 보존되는 안내 텍스트
    Text(String),
    Venues(Vec<Venue>),
    Vendors(Vec<Vendor>),
}

/// 제목이 있는 섹션
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// 원본 헤더 줄 (줄바꿈 제외)
    pub header: String,
    /// 정규화된 제목 (대문자, 공백 정리)
    pub title: String,
    pub body: SectionBody,
}

/// 구조화된 코퍼스 문서
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusDocument {
    /// 첫 헤더 이전 텍스트
    pub preamble: String,
    pub sections: Vec<Section>,
}

impl CorpusDocument {
    /// 원문 파싱
    ///
    /// 헤더로 인식되지 않는 줄은 모두 본문입니다.
    /// 디렉토리 섹션의 기존 본문은 `set_venues`/`set_vendors`로 교체될 때까지
    /// 텍스트로 보존합니다.
    pub fn parse(text: &str) -> Self {
        let mut doc = CorpusDocument::default();
        let mut current: Option<(String, String, String)> = None;

        for line in text.split_inclusive('\n') {
            let bare = line.trim_end_matches(['\n', '\r']);
            if let Some(title) = header_title(bare) {
                if let Some((header, title, body)) = current.take() {
                    doc.sections.push(Section {
                        header,
                        title,
                        body: SectionBody::Text(body),
                    });
                }
                current = Some((bare.to_string(), title, String::new()));
                continue;
            }

            match current.as_mut() {
                Some((_, _, body)) => body.push_str(line),
                None => doc.preamble.push_str(line),
            }
        }

        if let Some((header, title, body)) = current {
            doc.sections.push(Section {
                header,
                title,
                body: SectionBody::Text(body),
            });
        }

        doc
    }

    /// 제목으로 섹션 찾기 (대소문자/공백 무시)
    pub fn section(&self, title: &str) -> Option<&Section> {
        let wanted = normalize_title(title);
        self.sections.iter().find(|s| s.title == wanted)
    }

    /// 장소 목록 섹션 교체
    ///
    /// 빈 목록이면 기존 섹션 본문을 비우고, 섹션이 없으면 아무것도 하지 않습니다.
    pub fn set_venues(&mut self, venues: Vec<Venue>) {
        self.set_section(VENUE_SECTION, SectionBody::Venues(venues));
    }

    /// 업체 목록 섹션 교체
    pub fn set_vendors(&mut self, vendors: Vec<Vendor>) {
        self.set_section(VENDOR_SECTION, SectionBody::Vendors(vendors));
    }

    fn set_section(&mut self, title: &str, body: SectionBody) {
        let wanted = normalize_title(title);
        if let Some(section) = self.sections.iter_mut().find(|s| s.title == wanted) {
            section.body = body;
            return;
        }

        // 빈 목록이면 새 섹션을 만들지 않음
        let is_empty = match &body {
            SectionBody::Venues(venues) => venues.is_empty(),
            SectionBody::Vendors(vendors) => vendors.is_empty(),
            SectionBody::Text(text) => text.is_empty(),
        };
        if is_empty {
            return;
        }

        // 없으면 안내 섹션 앞, 그것도 없으면 맨 뒤
        let section = Section {
            header: format!("=== {} ===", wanted),
            title: wanted,
            body,
        };
        let guide = normalize_title(GUIDE_SECTION);
        match self.sections.iter().position(|s| s.title == guide) {
            Some(index) => self.sections.insert(index, section),
            None => self.sections.push(section),
        }
    }

    /// 텍스트로 직렬화
    pub fn render(&self) -> String {
        let mut out = self.preamble.clone();

        for section in &self.sections {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&section.header);
            out.push('\n');

            match &section.body {
                SectionBody::Text(text) => out.push_str(text),
                SectionBody::Venues(venues) => {
                    let rendered: Vec<String> = venues.iter().map(Venue::render).collect();
                    out.push_str(&rendered.join("\n"));
                    out.push('\n');
                }
                SectionBody::Vendors(vendors) => {
                    let rendered: Vec<String> = vendors.iter().map(Vendor::render).collect();
                    out.push_str(&rendered.join("\n"));
                    out.push('\n');
                }
            }
        }

        out
    }
}

/// `=== TITLE ===` 형식이면 정규화된 제목 반환
fn header_title(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix("===")?.strip_suffix("===")?;
    let title = normalize_title(inner);
    (!title.is_empty()).then_some(title)
}

fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

// ============================================================================
// Tests
// ============================================================================
