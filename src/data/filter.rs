use chrono::NaiveDate;

use super::model::{Dataset, ObservationRecord};

// ---------------------------------------------------------------------------
// Filter predicate: target and inclusive date window
// ---------------------------------------------------------------------------

/// Selection applied by consumers of a dataset. Unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetFilter {
    pub target: Option<String>,
    pub from: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl DatasetFilter {
    pub fn for_target(target: &str) -> Self {
        Self {
            target: Some(target.to_string()),
            ..Self::default()
        }
    }

    pub fn between(mut self, from: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        self.from = from;
        self.until = until;
        self
    }

    pub fn accepts(&self, record: &ObservationRecord) -> bool {
        if let Some(target) = &self.target {
            if &record.target != target {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.date_of_visit < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.date_of_visit > until {
                return false;
            }
        }
        true
    }
}

/// Return indices of records that pass the filter, in dataset order.
pub fn filtered_indices(dataset: &Dataset, filter: &DatasetFilter) -> Vec<usize> {
    dataset
        .records()
        .iter()
        .enumerate()
        .filter(|(_, record)| filter.accepts(record))
        .map(|(i, _)| i)
        .collect()
}

/// A new dataset holding only the records that pass the filter.
pub fn apply(dataset: &Dataset, filter: &DatasetFilter) -> Dataset {
    Dataset::assemble(
        filtered_indices(dataset, filter)
            .into_iter()
            .map(|i| dataset.records()[i].clone())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        let rec = |target: &str, y: i32, m: u32, d: u32| ObservationRecord {
            target: target.to_string(),
            date_of_visit: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            source_file: format!("{target}_{y}{m:02}{d:02}.fits"),
            sample_count: 1,
            row_index: None,
            fields: vec![("FLUX_mean".to_string(), 1.0)],
        };
        Dataset::assemble(vec![
            rec("WASP-43", 2021, 6, 1),
            rec("HD 88111", 2021, 7, 1),
            rec("WASP-43", 2022, 1, 5),
            rec("WASP-43", 2023, 3, 9),
        ])
    }

    #[test]
    fn default_filter_keeps_everything() {
        let ds = dataset();
        assert_eq!(filtered_indices(&ds, &DatasetFilter::default()), vec![0, 1, 2, 3]);
    }

    #[test]
    fn by_target() {
        let ds = dataset();
        assert_eq!(filtered_indices(&ds, &DatasetFilter::for_target("WASP-43")), vec![0, 2, 3]);
        assert!(filtered_indices(&ds, &DatasetFilter::for_target("nobody")).is_empty());
    }

    #[test]
    fn date_window_is_inclusive() {
        let ds = dataset();
        let filter = DatasetFilter::for_target("WASP-43").between(
            NaiveDate::from_ymd_opt(2021, 6, 1),
            NaiveDate::from_ymd_opt(2022, 1, 5),
        );
        assert_eq!(filtered_indices(&ds, &filter), vec![0, 2]);
        assert_eq!(apply(&ds, &filter).len(), 2);
    }
}
