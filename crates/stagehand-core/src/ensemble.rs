use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::ConfigError;
use crate::model::Params;
use crate::pages::PageSelection;

/// One ensemble member.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: usize,
    pub nmembers: usize,
    pub label: String,
    pub rank: String,
    pub props: BTreeMap<String, Value>,
}

impl Member {
    pub fn new(id: usize, nmembers: usize) -> Self {
        let width = nmembers.to_string().len();
        Self {
            id,
            nmembers,
            label: format!("member{:0width$}", id, width = width),
            rank: format!("{:0width$}/{}", id, nmembers, width = width),
            props: BTreeMap::new(),
        }
    }

    pub fn params(&self) -> Params {
        let mut params = Params::new();
        params.insert("member".into(), json!(self.id));
        params.insert("member_id".into(), json!(self.id));
        params.insert("member_label".into(), json!(self.label));
        params.insert("member_rank".into(), json!(self.rank));
        params.insert("nmembers".into(), json!(self.nmembers));
        for (name, value) in &self.props {
            params.insert(name.clone(), value.clone());
        }
        params
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Build the ensemble members.
///
/// Without `nmembers`, the size is the shortest iterator (0 when there are
/// none). Ids selected by `skip` are left out.
pub fn gen_ensemble(
    nmembers: Option<usize>,
    skip: Option<&PageSelection>,
    iters: &BTreeMap<String, Vec<Value>>,
) -> Result<Vec<Member>, ConfigError> {
    let nmembers = match nmembers {
        Some(n) => n,
        None => iters.values().map(Vec::len).min().unwrap_or(0),
    };

    for (name, values) in iters {
        if values.len() != nmembers {
            return Err(ConfigError::EnsembleLength {
                name: name.clone(),
                expected: nmembers,
                found: values.len(),
            });
        }
    }

    let skipped = skip.map(|s| s.resolve(nmembers)).unwrap_or_default();

    Ok((1..=nmembers)
        .filter(|id| !skipped.contains(id))
        .map(|id| {
            let mut member = Member::new(id, nmembers);
            member.props = iters
                .iter()
                .map(|(name, values)| (name.clone(), values[id - 1].clone()))
                .collect();
            member
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_members() {
        let members = gen_ensemble(Some(5), None, &BTreeMap::new()).unwrap();
        let ids: Vec<usize> = members.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_skip() {
        let skip: PageSelection = "3,5,7".parse().unwrap();
        let members = gen_ensemble(Some(10), Some(&skip), &BTreeMap::new()).unwrap();
        assert_eq!(members.len(), 7);
        assert!(members.iter().all(|m| ![3, 5, 7].contains(&m.id)));
    }

    #[test]
    fn test_label_and_rank_padding() {
        let member = Member::new(5, 100);
        assert_eq!(member.label, "member005");
        assert_eq!(member.rank, "005/100");
    }

    #[test]
    fn test_iters_assign_props() {
        let mut iters = BTreeMap::new();
        iters.insert("seed".to_string(), vec![json!(11), json!(22), json!(33)]);
        let members = gen_ensemble(None, None, &iters).unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members[1].props["seed"], json!(22));
        let params = members[1].params();
        assert_eq!(params["seed"], json!(22));
        assert!(!params.contains_key("member_seed"));
    }

    #[test]
    fn test_iter_length_mismatch() {
        let mut iters = BTreeMap::new();
        iters.insert("seed".to_string(), vec![json!(1), json!(2)]);
        let err = gen_ensemble(Some(3), None, &iters).unwrap_err();
        assert!(matches!(err, ConfigError::EnsembleLength { found: 2, .. }));
    }

    #[test]
    fn test_no_members() {
        assert!(gen_ensemble(None, None, &BTreeMap::new())
            .unwrap()
            .is_empty());
    }
}
