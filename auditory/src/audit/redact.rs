//! ヘッダー・クエリ文字列の機密値マスク
//!
//! 名前は大文字小文字を区別せずに照合し、値は同じ文字数の `*` に置き換える。

use crate::common::types::HttpHeaders;
use std::collections::HashSet;
use tracing::warn;

/// マスク文字
const MASK: char = '*';

/// 機密値マスク
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    names: HashSet<String>,
}

impl Redactor {
    /// 名前の列から作成
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        Self { names }
    }

    /// カンマ区切り文字列から作成
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    /// 対象の名前か
    pub fn is_sensitive(&self, name: &str) -> bool {
        self.names.contains(&name.to_ascii_lowercase())
    }

    /// ヘッダーの機密値をマスクする
    pub fn redact_headers(&self, headers: &mut HttpHeaders) {
        for (name, values) in headers.iter_mut() {
            if self.is_sensitive(name) {
                values.iter_mut().for_each(|value| *value = mask(value));
            }
        }
    }

    /// クエリ文字列の機密値をマスクする
    ///
    /// 対象が無ければ元の文字列をそのまま返す。解析できない場合は
    /// 機密値を残さないよう空文字列を返す。
    pub fn redact_query(&self, query: &str) -> String {
        if query.is_empty() || self.names.is_empty() {
            return query.to_string();
        }
        let mut masked = Vec::new();
        for pair in query.split('&') {
            if pair.is_empty() {
                masked.push(pair.to_string());
                continue;
            }
            let decoded: Vec<(String, String)> = match serde_urlencoded::from_str(pair) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(error = %e, "Failed to parse query string for redaction, dropping it");
                    return String::new();
                }
            };
            let sensitive = decoded.first().filter(|(name, _)| self.is_sensitive(name));
            match (sensitive, pair.split_once('=')) {
                (Some((_, value)), Some((raw_name, _))) => {
                    masked.push(format!("{}={}", raw_name, mask(value)));
                }
                _ => masked.push(pair.to_string()),
            }
        }
        masked.join("&")
    }
}

fn mask(value: &str) -> String {
    std::iter::repeat(MASK).take(value.chars().count()).collect()
}
