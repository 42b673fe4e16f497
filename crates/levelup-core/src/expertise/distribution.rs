//! Splitting one award across several domains.
//!
//! The split is even, with the integer remainder assigned to the first
//! domain in caller order, so the shares always sum to the awarded total.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Domain code used when a habit has no domains assigned.
pub const GENERAL_DOMAIN_CODE: &str = "general";

/// Display name of [`GENERAL_DOMAIN_CODE`].
pub const GENERAL_DOMAIN_NAME: &str = "General";

/// Portion of an award credited to one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainShare {
    pub domain_code: String,
    pub domain_name: String,
    pub points: i64,
    pub proportion: f64,
}

/// Split `total` across `domain_codes`.
///
/// Duplicate codes count once (first occurrence wins). Missing names fall
/// back to the code itself.
pub fn distribute(
    total: i64,
    domain_codes: &[String],
    names: &HashMap<String, String>,
) -> Vec<DomainShare> {
    let mut codes: Vec<&str> = Vec::with_capacity(domain_codes.len());
    for code in domain_codes {
        if !codes.contains(&code.as_str()) {
            codes.push(code);
        }
    }

    if codes.is_empty() {
        return vec![DomainShare {
            domain_code: GENERAL_DOMAIN_CODE.to_string(),
            domain_name: names
                .get(GENERAL_DOMAIN_CODE)
                .cloned()
                .unwrap_or_else(|| GENERAL_DOMAIN_NAME.to_string()),
            points: total,
            proportion: 1.0,
        }];
    }

    let n = codes.len() as i64;
    let per_domain = total.div_euclid(n);
    let remainder = total - per_domain * n;
    let proportion = 1.0 / n as f64;

    codes
        .iter()
        .enumerate()
        .map(|(i, code)| DomainShare {
            domain_code: code.to_string(),
            domain_name: names
                .get(*code)
                .cloned()
                .unwrap_or_else(|| code.to_string()),
            points: if i == 0 {
                per_domain + remainder
            } else {
                per_domain
            },
            proportion,
        })
        .collect()
}
