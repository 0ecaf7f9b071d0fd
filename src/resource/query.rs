use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::AppError;
use crate::resource::{Field, Resource};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// A parsed list request: equality filters, sort keys and a page window.
///
/// Built from the raw query string. `page`, `limit` and `sort` are reserved,
/// every other key must name a filterable field of the resource.
#[derive(Debug, Clone)]
pub struct ListSpec {
    pub filters: Vec<(&'static Field, String)>,
    pub sort: Vec<(&'static Field, Order)>,
    pub page: u32,
    pub limit: u32,
}

impl ListSpec {
    pub fn parse<R: Resource>(mut params: HashMap<String, String>) -> Result<Self, AppError> {
        let page = match params.remove("page") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|page| *page >= 1)
                .ok_or_else(|| AppError::ValidationError(format!("Invalid page: '{}'", raw)))?,
            None => 1,
        };
        let limit = match params.remove("limit") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|limit| (1..=MAX_LIMIT).contains(limit))
                .ok_or_else(|| {
                    AppError::ValidationError(format!(
                        "Invalid limit: '{}' (expected 1 to {})",
                        raw, MAX_LIMIT
                    ))
                })?,
            None => DEFAULT_LIMIT,
        };

        let sort_param = params
            .remove("sort")
            .unwrap_or_else(|| R::DEFAULT_SORT.to_string());
        let mut sort = Vec::new();
        for key in sort_param.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            let (name, order) = match key.strip_prefix('-') {
                Some(name) => (name, Order::Desc),
                None => (key, Order::Asc),
            };
            let field = R::FIELDS
                .iter()
                .find(|f| f.sort && f.name == name)
                .ok_or_else(|| {
                    AppError::ValidationError(format!("Cannot sort {}s by '{}'", R::NAME, name))
                })?;
            sort.push((field, order));
        }

        let mut filters = Vec::new();
        for (name, value) in params {
            let field = R::FIELDS
                .iter()
                .find(|f| f.filter && f.name == name)
                .ok_or_else(|| {
                    AppError::ValidationError(format!("Cannot filter {}s by '{}'", R::NAME, name))
                })?;
            filters.push((field, value));
        }
        // HashMap order is arbitrary; keep generated SQL stable
        filters.sort_by_key(|(field, _)| field.name);

        Ok(Self {
            filters,
            sort,
            page,
            limit,
        })
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }

    pub fn matches<R: Resource>(&self, item: &R) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| item.filter_value(field.name).as_deref() == Some(value.as_str()))
    }

    /// Filters, sorts and pages `items` the way the SQL store would.
    pub fn apply<R: Resource>(&self, items: impl IntoIterator<Item = R>) -> Vec<R> {
        let mut items: Vec<R> = items.into_iter().filter(|item| self.matches(item)).collect();
        items.sort_by(|a, b| {
            self.sort
                .iter()
                .map(|(field, order)| {
                    let ordering = a.sort_key(field.name).cmp(&b.sort_key(field.name));
                    match order {
                        Order::Asc => ordering,
                        Order::Desc => ordering.reverse(),
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| a.id().cmp(&b.id()))
        });
        items
            .into_iter()
            .skip(self.offset() as usize)
            .take(self.limit as usize)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTask, Task, TaskPriority, TaskStatus};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn task(title: &str, priority: TaskPriority, days_ago: i64) -> Task {
        Task::new(NewTask {
            user_id: Uuid::new_v4(),
            title: title.into(),
            description: "d".into(),
            date: Utc::now() - Duration::days(days_ago),
            priority,
            status: TaskStatus::InProgress,
        })
    }

    #[test]
    fn test_defaults() {
        let spec = ListSpec::parse::<Task>(HashMap::new()).unwrap();
        assert_eq!(spec.page, 1);
        assert_eq!(spec.limit, DEFAULT_LIMIT);
        assert_eq!(spec.offset(), 0);
        assert_eq!(spec.sort.len(), 1);
        assert_eq!(spec.sort[0].0.name, "date");
        assert_eq!(spec.sort[0].1, Order::Desc);
        assert!(spec.filters.is_empty());
    }

    #[test]
    fn test_parse_filters_sort_and_page() {
        let spec = ListSpec::parse::<Task>(params(&[
            ("status", "completed"),
            ("priority", "high"),
            ("sort", "priority,-createdAt"),
            ("page", "3"),
            ("limit", "10"),
        ]))
        .unwrap();

        assert_eq!(spec.offset(), 20);
        let filters: Vec<_> = spec
            .filters
            .iter()
            .map(|(f, v)| (f.column, v.as_str()))
            .collect();
        assert_eq!(filters, vec![("priority", "high"), ("status", "completed")]);
        let sort: Vec<_> = spec.sort.iter().map(|(f, o)| (f.column, *o)).collect();
        assert_eq!(sort, vec![("priority", Order::Asc), ("created_at", Order::Desc)]);
    }

    #[test]
    fn test_rejects_unknown_fields_and_bad_windows() {
        assert!(ListSpec::parse::<Task>(params(&[("userId", "x")])).is_err());
        assert!(ListSpec::parse::<Task>(params(&[("sort", "description")])).is_err());
        assert!(ListSpec::parse::<Task>(params(&[("page", "0")])).is_err());
        assert!(ListSpec::parse::<Task>(params(&[("limit", "500")])).is_err());
        assert!(ListSpec::parse::<Task>(params(&[("limit", "ten")])).is_err());
    }

    #[test]
    fn test_apply_filters_sorts_and_pages() {
        let items = vec![
            task("old high", TaskPriority::High, 3),
            task("new low", TaskPriority::Low, 0),
            task("mid high", TaskPriority::High, 1),
        ];

        let spec = ListSpec::parse::<Task>(params(&[("priority", "high")])).unwrap();
        let titles: Vec<_> = spec
            .apply(items.clone())
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["mid high", "old high"]);

        let spec =
            ListSpec::parse::<Task>(params(&[("sort", "priority,date"), ("limit", "2")])).unwrap();
        let titles: Vec<_> = spec
            .apply(items.clone())
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["new low", "old high"]);

        let spec = ListSpec::parse::<Task>(params(&[
            ("sort", "priority,date"),
            ("limit", "2"),
            ("page", "2"),
        ]))
        .unwrap();
        let titles: Vec<_> = spec.apply(items).into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["mid high"]);
    }
}
