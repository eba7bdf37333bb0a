use std::path::Path;

use super::config::{AbTest, AbTestStatus};
use crate::error::Result;
use crate::storage::JsonStore;
use crate::types::Channel;

#[derive(Debug, Default, Clone)]
pub struct AbTestFilter {
    pub status: Option<AbTestStatus>,
    pub channel: Option<Channel>,
    pub campaign_id: Option<String>,
}

impl AbTestFilter {
    fn matches(&self, test: &AbTest) -> bool {
        if let Some(status) = self.status {
            if test.status != status {
                return false;
            }
        }
        if let Some(channel) = self.channel {
            if test.channel != channel {
                return false;
            }
        }
        if let Some(ref campaign_id) = self.campaign_id {
            if test.campaign_id.as_ref() != Some(campaign_id) {
                return false;
            }
        }
        true
    }
}

/// Storage seam for A/B tests. Lifecycle operations in
/// [`super::lifecycle`] only talk to this trait.
///
/// `update` and `delete` run their closure while the test is locked, so
/// checks made inside it still hold when the change lands.
pub trait TestRepository: Send + Sync {
    fn get(&self, id: &str) -> Result<AbTest>;
    fn list(&self, filter: Option<&AbTestFilter>) -> Vec<AbTest>;
    fn insert(&self, test: AbTest) -> Result<AbTest>;
    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut AbTest) -> Result<()>,
    ) -> Result<AbTest>;
    fn delete(&self, id: &str, check: &mut dyn FnMut(&AbTest) -> Result<()>) -> Result<()>;
}

pub struct AbTestStore {
    inner: JsonStore<AbTest>,
}

impl AbTestStore {
    pub fn new(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            inner: JsonStore::open(data_dir, "abtests")?,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl TestRepository for AbTestStore {
    fn get(&self, id: &str) -> Result<AbTest> {
        self.inner.get(id)
    }

    fn list(&self, filter: Option<&AbTestFilter>) -> Vec<AbTest> {
        match filter {
            Some(f) => self.inner.filter(|t| f.matches(t)),
            None => self.inner.all(),
        }
    }

    fn insert(&self, test: AbTest) -> Result<AbTest> {
        self.inner.insert(test)
    }

    fn update(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut AbTest) -> Result<()>,
    ) -> Result<AbTest> {
        self.inner.update(id, |test| apply(test))
    }

    fn delete(&self, id: &str, check: &mut dyn FnMut(&AbTest) -> Result<()>) -> Result<()> {
        self.inner.remove_if(id, |test| check(test)).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abtests::config::{ConfidenceSource, Variant};
    use crate::error::LeadflowError;
    use tempfile::TempDir;

    fn make_test(id: &str, channel: Channel, created_at: i64) -> AbTest {
        AbTest {
            id: id.to_string(),
            name: format!("test {id}"),
            channel,
            campaign_id: None,
            hypothesis: None,
            status: AbTestStatus::Running,
            variants: vec![
                Variant {
                    id: "a".into(),
                    name: "A".into(),
                    message: "one".into(),
                    sent: 10,
                    clicks: 2,
                    conversions: 1,
                },
                Variant {
                    id: "b".into(),
                    name: "B".into(),
                    message: "two".into(),
                    sent: 10,
                    clicks: 3,
                    conversions: 0,
                },
            ],
            confidence_level: 50,
            confidence_source: ConfidenceSource::Stated,
            winner: None,
            target_sample_size: None,
            created_at,
            updated_at: created_at,
            ended_at: None,
        }
    }

    #[test]
    fn insert_and_get() {
        let tmp = TempDir::new().unwrap();
        let store = AbTestStore::new(tmp.path()).unwrap();
        store.insert(make_test("t1", Channel::Instagram, 1)).unwrap();
        assert_eq!(store.get("t1").unwrap().name, "test t1");
        assert!(tmp.path().join(".abtests").join("t1.json").exists());
    }

    #[test]
    fn insert_invalid_test_fails() {
        let tmp = TempDir::new().unwrap();
        let store = AbTestStore::new(tmp.path()).unwrap();
        let mut bad = make_test("t1", Channel::Instagram, 1);
        bad.variants[0].clicks = 11;
        assert!(matches!(
            store.insert(bad),
            Err(LeadflowError::Validation(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn list_filters_by_status_and_channel() {
        let tmp = TempDir::new().unwrap();
        let store = AbTestStore::new(tmp.path()).unwrap();
        store.insert(make_test("t1", Channel::Instagram, 1)).unwrap();
        store.insert(make_test("t2", Channel::Facebook, 2)).unwrap();
        let mut paused = make_test("t3", Channel::Instagram, 3);
        paused.status = AbTestStatus::Paused;
        store.insert(paused).unwrap();

        let ig = store.list(Some(&AbTestFilter {
            channel: Some(Channel::Instagram),
            ..Default::default()
        }));
        assert_eq!(ig.len(), 2);

        let running_ig = store.list(Some(&AbTestFilter {
            status: Some(AbTestStatus::Running),
            channel: Some(Channel::Instagram),
            campaign_id: None,
        }));
        assert_eq!(running_ig.len(), 1);
        assert_eq!(running_ig[0].id, "t1");
    }

    #[test]
    fn list_is_ordered_by_creation() {
        let tmp = TempDir::new().unwrap();
        let store = AbTestStore::new(tmp.path()).unwrap();
        store.insert(make_test("late", Channel::Email, 9)).unwrap();
        store.insert(make_test("early", Channel::Email, 1)).unwrap();
        let ids: Vec<String> = store.list(None).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn tests_persist_across_store_restart() {
        let tmp = TempDir::new().unwrap();
        {
            let store = AbTestStore::new(tmp.path()).unwrap();
            store.insert(make_test("t1", Channel::Email, 1)).unwrap();
        }
        let store2 = AbTestStore::new(tmp.path()).unwrap();
        assert_eq!(store2.get("t1").unwrap().id, "t1");
    }

    #[test]
    fn new_store_rejects_invalid_test_from_disk() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join(".abtests");
        std::fs::create_dir_all(&dir).unwrap();
        let mut invalid = make_test("bad1", Channel::Email, 1);
        invalid.winner = Some("nope".to_string());
        std::fs::write(
            dir.join("bad1.json"),
            serde_json::to_string_pretty(&invalid).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            AbTestStore::new(tmp.path()),
            Err(LeadflowError::Validation(_))
        ));
    }
}
