//! Kafka side of ch-sync: batch delivery through a [`KafkaSink`] and topic
//! lifecycle through a [`TopicAdmin`].

pub mod admin;
pub mod producer;

pub use admin::{
    BrokerView, MetadataLookup, PartitionInfo, RdKafkaLookup, TopicAdmin, TopicInfo, Watermarks,
};
pub use producer::{classify, KafkaSink};

/// Partition count for a topic expected to hold `rows` rows.
///
/// `ceil(rows / rows_per_partition)`, never below one.
pub fn partitions_for_rows(rows: u64, rows_per_partition: i64) -> i32 {
    if rows_per_partition <= 0 || rows == 0 {
        return 1;
    }
    let parts = rows.div_ceil(rows_per_partition as u64);
    i32::try_from(parts).unwrap_or(i32::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_for_rows() {
        assert_eq!(partitions_for_rows(0, 1_000_000), 1);
        assert_eq!(partitions_for_rows(10, 0), 1);
        assert_eq!(partitions_for_rows(10, -5), 1);
        assert_eq!(partitions_for_rows(1_000_000, 1_000_000), 1);
        assert_eq!(partitions_for_rows(1_000_001, 1_000_000), 2);
        assert_eq!(partitions_for_rows(25, 10), 3);
    }
}
