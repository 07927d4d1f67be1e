use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    sync::{Arc, RwLock},
    time::Instant,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,

    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub location: Option<String>,

    /// Derived from title and description, absent until computed.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ItemCreate {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Persistence boundary for items. Only the embedding column is ever
/// written after creation.
pub trait ItemStore: Send + Sync {
    fn create(&self, item: ItemCreate) -> anyhow::Result<Item>;
    fn get_by_id(&self, id: u64) -> anyhow::Result<Option<Item>>;
    /// Items whose stored type equals `kind` exactly, in id order.
    fn get_by_type(&self, kind: &str) -> anyhow::Result<Vec<Item>>;
    fn set_embedding(&self, id: u64, embedding: Vec<f32>) -> anyhow::Result<()>;
    fn list(&self) -> anyhow::Result<Vec<Item>>;
}

#[derive(Debug, Clone, Default)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<Item>>>,
    path: String,
}

const CSV_HEADERS: [&str; 7] = [
    "id",
    "title",
    "description",
    "type",
    "location",
    "embedding",
    "created_at",
];

/// Empty optional columns read back as `None`.
fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Same rule applied on create, so a fresh item looks like a reloaded one.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

impl BackendCsv {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new item database at {path}");
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;

        let mut items = vec![];
        for record in csv_reader.records() {
            let record = record?;
            let field = |idx: usize, name: &str| {
                record
                    .get(idx)
                    .ok_or_else(|| anyhow!("couldnt get record {name}"))
            };

            let id = field(0, "id")?.parse::<u64>()?;
            let title = field(1, "title")?.to_string();
            let description = optional(field(2, "description")?);
            let kind = field(3, "type")?.to_string();
            let location = optional(field(4, "location")?);
            let embedding = match field(5, "embedding")? {
                "" => None,
                raw => Some(serde_json::from_str::<Vec<f32>>(raw)?),
            };
            let created_at = DateTime::parse_from_rfc3339(field(6, "created_at")?)?
                .with_timezone(&Utc);

            items.push(Item {
                id,
                title,
                description,
                kind,
                location,
                embedding,
                created_at,
            });
        }

        log::debug!(
            "took {}ms to read {} items",
            now.elapsed().as_micros() as f64 / 1000.0,
            items.len()
        );

        Ok(BackendCsv {
            list: Arc::new(RwLock::new(items)),
            path: path.to_string(),
        })
    }

    fn save(&self, items: &[Item]) -> anyhow::Result<()> {
        let temp_path = format!("{}-tmp", &self.path);
        let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
        csv_wrt.write_record(CSV_HEADERS)?;
        for item in items {
            let embedding = match &item.embedding {
                Some(values) => serde_json::to_string(values)?,
                None => String::new(),
            };
            let id = item.id.to_string();
            let created_at = item.created_at.to_rfc3339();
            csv_wrt.write_record([
                id.as_str(),
                item.title.as_str(),
                item.description.as_deref().unwrap_or_default(),
                item.kind.as_str(),
                item.location.as_deref().unwrap_or_default(),
                embedding.as_str(),
                created_at.as_str(),
            ])?;
        }
        csv_wrt.flush()?;
        drop(csv_wrt);

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn read_list(&self) -> anyhow::Result<std::sync::RwLockReadGuard<'_, Vec<Item>>> {
        self.list
            .read()
            .map_err(|err| anyhow!("item list lock poisoned: {err}"))
    }

    fn write_list(&self) -> anyhow::Result<std::sync::RwLockWriteGuard<'_, Vec<Item>>> {
        self.list
            .write()
            .map_err(|err| anyhow!("item list lock poisoned: {err}"))
    }
}

impl ItemStore for BackendCsv {
    fn create(&self, item_create: ItemCreate) -> anyhow::Result<Item> {
        let mut items = self.write_list()?;

        let id = items.last().map(|last| last.id + 1).unwrap_or(1);

        let item = Item {
            id,
            title: item_create.title,
            description: non_empty(item_create.description),
            kind: item_create.kind,
            location: non_empty(item_create.location),
            embedding: None,
            created_at: Utc::now(),
        };

        // memory only changes once the file is written
        let mut updated = items.clone();
        updated.push(item.clone());
        self.save(&updated)?;
        *items = updated;

        Ok(item)
    }

    fn get_by_id(&self, id: u64) -> anyhow::Result<Option<Item>> {
        let items = self.read_list()?;
        Ok(items.iter().find(|item| item.id == id).cloned())
    }

    fn get_by_type(&self, kind: &str) -> anyhow::Result<Vec<Item>> {
        let items = self.read_list()?;
        Ok(items.iter().filter(|item| item.kind == kind).cloned().collect())
    }

    fn set_embedding(&self, id: u64, embedding: Vec<f32>) -> anyhow::Result<()> {
        let mut items = self.write_list()?;

        // unknown ids update nothing
        let Some(idx) = items.iter().position(|item| item.id == id) else {
            log::debug!("set_embedding: no item with id {id}");
            return Ok(());
        };

        let mut updated = items.clone();
        updated[idx].embedding = Some(embedding);
        self.save(&updated)?;
        *items = updated;

        Ok(())
    }

    fn list(&self) -> anyhow::Result<Vec<Item>> {
        Ok(self.read_list()?.clone())
    }
}
