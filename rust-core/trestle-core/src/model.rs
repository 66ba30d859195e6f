//! # Models
//!
//! A model is an attribute map masked by a static schema: `FILLABLE`
//! decides which keys callers may assign and `HIDDEN` which keys are left
//! out of serialized output. Rows loaded from the database bypass the
//! fillable filter so the primary key and timestamps survive.
//!
//! ```ignore
//! struct User;
//!
//! impl ModelSchema for User {
//!     const TABLE: &'static str = "users";
//!     const FILLABLE: &'static [&'static str] = &["name", "email", "password"];
//!     const HIDDEN: &'static [&'static str] = &["password"];
//! }
//!
//! let mut user = Model::<User>::new(record([("name", "Ada")]));
//! user.save(&db).await?;
//! ```

use crate::database::{Database, DatabaseAdapter, DbValue, QueryBuilder, Record};
use crate::error::Result;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::marker::PhantomData;

/// Static description of a table-backed model
pub trait ModelSchema: 'static {
    /// Table name
    const TABLE: &'static str;
    /// Primary key column
    const PRIMARY_KEY: &'static str = "id";
    /// Columns callers may assign
    const FILLABLE: &'static [&'static str];
    /// Columns omitted from serialized output
    const HIDDEN: &'static [&'static str] = &[];
}

/// One row of the table described by `S`
pub struct Model<S: ModelSchema> {
    attributes: Record,
    schema: PhantomData<fn() -> S>,
}

impl<S: ModelSchema> Clone for Model<S> {
    fn clone(&self) -> Self {
        Self {
            attributes: self.attributes.clone(),
            schema: PhantomData,
        }
    }
}

impl<S: ModelSchema> std::fmt::Debug for Model<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("table", &S::TABLE)
            .field("attributes", &self.attributes())
            .finish()
    }
}

impl<S: ModelSchema> Default for Model<S> {
    fn default() -> Self {
        Self {
            attributes: Record::new(),
            schema: PhantomData,
        }
    }
}

impl<S: ModelSchema> Model<S> {
    /// New model holding the fillable subset of `attributes`
    #[must_use]
    pub fn new(attributes: Record) -> Self {
        let mut model = Self::default();
        model.fill(attributes);
        model
    }

    /// New model from a JSON object, e.g. request input
    #[must_use]
    pub fn from_input(input: &Map<String, Value>) -> Self {
        Self::new(
            input
                .iter()
                .map(|(key, value)| (key.clone(), DbValue::from_json(value)))
                .collect(),
        )
    }

    /// Model for a stored row; every column is kept
    #[must_use]
    pub fn hydrate(row: Record) -> Self {
        Self {
            attributes: row,
            schema: PhantomData,
        }
    }

    /// Assign every fillable key of `attributes`; other keys are ignored
    pub fn fill(&mut self, attributes: Record) -> &mut Self {
        for (key, value) in attributes {
            self.set(&key, value);
        }
        self
    }

    /// Assign one attribute; returns `false` if `key` is not fillable
    pub fn set(&mut self, key: &str, value: impl Into<DbValue>) -> bool {
        if !S::FILLABLE.contains(&key) {
            return false;
        }
        self.attributes.insert(key.to_string(), value.into());
        true
    }

    /// Attribute value, hidden ones included
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&DbValue> {
        self.attributes.get(key)
    }

    /// Primary key value, if the model has been stored
    #[must_use]
    pub fn id(&self) -> Option<&DbValue> {
        self.get(S::PRIMARY_KEY).filter(|id| !id.is_null())
    }

    /// Attributes without hidden keys
    #[must_use]
    pub fn attributes(&self) -> Record {
        self.visible().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Attributes without hidden keys, as a JSON object
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.visible()
                .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                .collect(),
        )
    }

    fn visible(&self) -> impl Iterator<Item = (&String, &DbValue)> {
        self.attributes
            .iter()
            .filter(|(key, _)| !S::HIDDEN.contains(&key.as_str()))
    }

    /// Query builder on this model's table
    #[must_use]
    pub fn query<A: DatabaseAdapter>(db: &Database<A>) -> QueryBuilder<'static, A> {
        db.table(S::TABLE)
    }

    /// Query builder filtered by one predicate
    #[must_use]
    pub fn where_<A: DatabaseAdapter>(
        db: &Database<A>,
        column: &str,
        operator: &str,
        value: impl Into<DbValue>,
    ) -> QueryBuilder<'static, A> {
        Self::query(db).where_(column, operator, value)
    }

    /// Load by primary key
    ///
    /// # Errors
    ///
    /// Propagates database errors.
    pub async fn find<A: DatabaseAdapter>(db: &Database<A>, id: impl Into<DbValue>) -> Result<Option<Self>> {
        let row = Self::where_(db, S::PRIMARY_KEY, "=", id).first().await?;
        Ok(row.map(Self::hydrate))
    }

    /// Load every row
    ///
    /// # Errors
    ///
    /// Propagates database errors.
    pub async fn all<A: DatabaseAdapter>(db: &Database<A>) -> Result<Vec<Self>> {
        let rows = Self::query(db).get().await?;
        Ok(rows.into_iter().map(Self::hydrate).collect())
    }

    /// Insert when the model has no primary key, otherwise update by it
    ///
    /// After an insert the generated id is stored on the model. Returns
    /// whether a row was written.
    ///
    /// # Errors
    ///
    /// Propagates database errors.
    pub async fn save<A: DatabaseAdapter>(&mut self, db: &Database<A>) -> Result<bool> {
        match self.id().cloned() {
            Some(id) => {
                let mut data = self.attributes.clone();
                data.remove(S::PRIMARY_KEY);
                if data.is_empty() {
                    return Ok(false);
                }
                let affected = Self::where_(db, S::PRIMARY_KEY, "=", id).update(&data).await?;
                Ok(affected > 0)
            }
            None => {
                let id = db.insert_returning_id(S::TABLE, &self.attributes).await?;
                let id = id.parse::<i64>().map_or(DbValue::String(id), DbValue::Int);
                self.attributes.insert(S::PRIMARY_KEY.to_string(), id);
                Ok(true)
            }
        }
    }

    /// Delete by primary key; `false` for a model that was never stored
    ///
    /// # Errors
    ///
    /// Propagates database errors.
    pub async fn delete<A: DatabaseAdapter>(&self, db: &Database<A>) -> Result<bool> {
        let Some(id) = self.id().cloned() else {
            return Ok(false);
        };
        let affected = Self::where_(db, S::PRIMARY_KEY, "=", id).delete().await?;
        Ok(affected > 0)
    }
}

impl<S: ModelSchema> Serialize for Model<S> {
    fn serialize<Se: Serializer>(&self, serializer: Se) -> std::result::Result<Se::Ok, Se::Error> {
        let visible: Vec<_> = self.visible().collect();
        let mut map = serializer.serialize_map(Some(visible.len()))?;
        for (key, value) in visible {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
