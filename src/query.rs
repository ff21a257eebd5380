// src/query.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::object::ParseObject;
use crate::transport::{RestCommand, Transport};

#[derive(Deserialize, Debug)]
struct FindResponse {
    results: Vec<Value>,
}

/// Represents a query to be performed against a Parse Server class.
#[derive(Debug, Clone)]
pub struct ParseQuery {
    class_name: String,
    conditions: Map<String, Value>,
    limit: Option<isize>,
    skip: Option<usize>,
    order: Option<String>,
}

impl ParseQuery {
    /// Creates a new `ParseQuery` for the specified class name.
    pub fn new(class_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            conditions: Map::new(),
            limit: None,
            skip: None,
            order: None,
        }
    }

    /// Returns the class name this query targets.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    // Helper to add an operator condition like "field": {"$op": "value"}
    fn add_operator_condition(&mut self, key: &str, operator: &str, value: Value) -> &mut Self {
        let mut op_map = Map::new();
        op_map.insert(operator.to_string(), value);
        self.conditions
            .insert(key.to_string(), Value::Object(op_map));
        self
    }

    /// Adds a constraint to the query that a field must be equal to a specified value.
    pub fn equal_to<V: Serialize>(&mut self, key: &str, value: V) -> &mut Self {
        if let Ok(json_val) = serde_json::to_value(value) {
            self.conditions.insert(key.to_string(), json_val);
        }
        self
    }

    /// Adds a constraint to the query that a field must not be equal to a specified value.
    pub fn not_equal_to<V: Serialize>(&mut self, key: &str, value: V) -> &mut Self {
        match serde_json::to_value(value) {
            Ok(json_val) => self.add_operator_condition(key, "$ne", json_val),
            Err(_) => self,
        }
    }

    /// Adds a constraint to the query that a field must exist.
    pub fn exists(&mut self, key: &str) -> &mut Self {
        self.add_operator_condition(key, "$exists", Value::Bool(true))
    }

    /// Adds a constraint for finding objects where a field's value is contained in the provided list of values.
    pub fn contained_in<V: Serialize>(&mut self, key: &str, values: Vec<V>) -> &mut Self {
        match serde_json::to_value(values) {
            Ok(json_val_array) => self.add_operator_condition(key, "$in", json_val_array),
            Err(_) => self,
        }
    }

    /// Sets the maximum number of results to return.
    pub fn limit(&mut self, count: isize) -> &mut Self {
        self.limit = Some(count);
        self
    }

    /// Sets the number of results to skip before returning.
    pub fn skip(&mut self, count: usize) -> &mut Self {
        self.skip = Some(count);
        self
    }

    /// Sets the order of the results, e.g. `"score,-playerName"`.
    pub fn order(&mut self, field_names: &str) -> &mut Self {
        self.order = Some(field_names.to_string());
        self
    }

    pub fn build_query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if !self.conditions.is_empty() {
            if let Ok(where_json) = serde_json::to_string(&self.conditions) {
                params.push(("where".to_string(), where_json));
            }
        }
        if let Some(limit_val) = self.limit {
            params.push(("limit".to_string(), limit_val.to_string()));
        }
        if let Some(skip_val) = self.skip {
            params.push(("skip".to_string(), skip_val.to_string()));
        }
        if let Some(order_val) = &self.order {
            params.push(("order".to_string(), order_val.clone()));
        }
        params
    }

    /// Retrieves the objects that match this query.
    pub async fn find<T: Transport + ?Sized>(
        &self,
        transport: &T,
    ) -> Result<Vec<ParseObject>, ParseError> {
        let response = transport
            .execute(RestCommand::Find {
                class_name: self.class_name.clone(),
                params: self.build_query_params(),
            })
            .await?;
        let wrapper: FindResponse = serde_json::from_slice(&response).map_err(|e| {
            ParseError::JsonDeserializationFailed(format!(
                "Failed to decode query results for class {}: {}",
                self.class_name, e
            ))
        })?;
        wrapper
            .results
            .iter()
            .map(|value| ParseObject::from_wire(&self.class_name, value))
            .collect()
    }

    /// Retrieves the first object that matches this query.
    pub async fn first<T: Transport + ?Sized>(
        &self,
        transport: &T,
    ) -> Result<Option<ParseObject>, ParseError> {
        let mut query_clone = self.clone();
        query_clone.limit(1);
        Ok(query_clone.find(transport).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_where_and_paging_params() {
        let mut query = ParseQuery::new("GameScore");
        query
            .contained_in("objectId", vec!["a", "b"])
            .limit(2)
            .order("-updatedAt");
        let params = query.build_query_params();
        let where_value: Value = serde_json::from_str(&params[0].1).unwrap();
        assert_eq!(where_value, json!({"objectId": {"$in": ["a", "b"]}}));
        assert_eq!(params[1], ("limit".to_string(), "2".to_string()));
        assert_eq!(params[2], ("order".to_string(), "-updatedAt".to_string()));
    }
}
