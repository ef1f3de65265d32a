use shared::{DetectionRecord, SortDirection, SortKey, SortState};
use std::cmp::Ordering;

pub const CONFIDENT_THRESHOLD: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Aggregates {
    pub total: usize,
    pub confident: usize,
}

impl Aggregates {
    fn of(records: &[DetectionRecord]) -> Self {
        Self {
            total: records.len(),
            confident: records
                .iter()
                .filter(|record| record.confidence_percent >= CONFIDENT_THRESHOLD)
                .count(),
        }
    }
}

/// Current detections in arrival order, plus how they should be presented.
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    records: Vec<DetectionRecord>,
    sort: SortState,
    aggregates: Aggregates,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, records: Vec<DetectionRecord>) {
        self.records = records;
        self.recompute();
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.recompute();
    }

    pub fn records(&self) -> &[DetectionRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn aggregates(&self) -> Aggregates {
        self.aggregates
    }

    pub fn sort_state(&self) -> SortState {
        self.sort
    }

    pub fn select_sort(&mut self, key: SortKey) -> SortState {
        self.sort = self.sort.select(key);
        self.sort
    }

    pub fn set_sort(&mut self, sort: SortState) {
        self.sort = sort;
    }

    pub fn sorted(&self) -> Vec<&DetectionRecord> {
        let mut rows: Vec<&DetectionRecord> = self.records.iter().collect();
        let SortState { key, direction } = self.sort;
        // sort_by is stable, so equal rows keep arrival order in both directions
        rows.sort_by(|a, b| {
            let ordering = compare(a, b, key);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
        rows
    }

    pub fn top(&self) -> Option<&DetectionRecord> {
        self.sorted().into_iter().next()
    }

    fn recompute(&mut self) {
        self.aggregates = Aggregates::of(&self.records);
    }
}

pub fn compare(a: &DetectionRecord, b: &DetectionRecord, key: SortKey) -> Ordering {
    match key {
        SortKey::Confidence => a.confidence_percent.cmp(&b.confidence_percent),
        SortKey::Label => a.label.cmp(&b.label),
        SortKey::BoundingBox => a.bounding_box.cmp(&b.bounding_box),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ColorKey, DetectionId};

    fn record(id: &str, label: &str, confidence: u8, bbox: &str) -> DetectionRecord {
        DetectionRecord {
            id: DetectionId::from(id.to_string()),
            label: label.into(),
            confidence_percent: confidence,
            bounding_box: bbox.into(),
            color_key: ColorKey::Emerald,
        }
    }

    fn sample() -> Vec<DetectionRecord> {
        vec![
            record("car", "Car", 94, "(80, 120, 260, 280)"),
            record("person", "Person", 89, "(340, 80, 480, 260)"),
            record("bike", "Bike", 87, "(150, 260, 250, 340)"),
            record("tree", "Tree", 82, "(20, 30, 100, 90)"),
            record("sign", "Sign", 76, "(380, 280, 500, 370)"),
        ]
    }

    fn ids(rows: &[&DetectionRecord]) -> Vec<String> {
        rows.iter().map(|r| r.id.to_string()).collect()
    }

    #[test]
    fn aggregates_count_confident_rows() {
        let mut table = ResultTable::new();
        table.replace(sample());
        assert_eq!(
            table.aggregates(),
            Aggregates {
                total: 5,
                confident: 3
            }
        );

        table.clear();
        assert_eq!(table.aggregates(), Aggregates::default());
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut table = ResultTable::new();
        table.replace(vec![record("a", "A", 85, ""), record("b", "B", 84, "")]);
        assert_eq!(table.aggregates().confident, 1);
    }

    #[test]
    fn default_order_is_confidence_descending() {
        let mut table = ResultTable::new();
        table.replace(sample());
        assert_eq!(
            ids(&table.sorted()),
            vec!["car", "person", "bike", "tree", "sign"]
        );
        assert_eq!(table.top().map(|r| r.label.as_str()), Some("Car"));
    }

    #[test]
    fn sort_selection_toggles_and_resets() {
        let mut table = ResultTable::new();
        table.replace(sample());

        let state = table.select_sort(SortKey::Confidence);
        assert_eq!(state.direction, SortDirection::Asc);
        assert_eq!(ids(&table.sorted())[0], "sign");

        let state = table.select_sort(SortKey::Label);
        assert_eq!(state.direction, SortDirection::Desc);
        assert_eq!(
            ids(&table.sorted()),
            vec!["tree", "sign", "person", "car", "bike"]
        );

        // canonical strings compare bytewise, so "(150" sorts before "(20"
        table.select_sort(SortKey::BoundingBox);
        table.select_sort(SortKey::BoundingBox);
        assert_eq!(
            ids(&table.sorted()),
            vec!["bike", "tree", "person", "sign", "car"]
        );
    }

    #[test]
    fn equal_confidence_keeps_arrival_order_both_ways() {
        let mut table = ResultTable::new();
        table.replace(vec![
            record("first", "Zebra", 50, ""),
            record("high", "Cat", 90, ""),
            record("second", "Ant", 50, ""),
            record("third", "Moth", 50, ""),
        ]);

        table.set_sort(SortState {
            key: SortKey::Confidence,
            direction: SortDirection::Asc,
        });
        assert_eq!(
            ids(&table.sorted()),
            vec!["first", "second", "third", "high"]
        );

        table.select_sort(SortKey::Confidence);
        assert_eq!(
            ids(&table.sorted()),
            vec!["high", "first", "second", "third"]
        );
    }

    #[test]
    fn sorting_never_reorders_stored_records() {
        let mut table = ResultTable::new();
        table.replace(sample());
        table.select_sort(SortKey::Label);
        let _ = table.sorted();
        assert_eq!(table.records()[0].id.as_str(), "car");
    }
}
