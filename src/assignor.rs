use std::collections::BTreeMap;

use crate::{
    error::{Error, Result},
    topic_partition::TopicPartition,
};

pub const ROUND_ROBIN_PROTOCOL: &str = "roundrobin";
pub const RANGE_PROTOCOL: &str = "range";

/// A group member and the topics it asked for.
#[derive(Debug, Clone)]
pub struct MemberSubscription<'a> {
    pub member_id: &'a str,
    pub topics: &'a [String],
}

impl<'a> MemberSubscription<'a> {
    fn wants(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }
}

/// Spread the partitions of `topic_partitions` over `members`.
///
/// Returns one assignment per member, in the order the members were given.
pub fn assign(
    strategy: &str,
    members: &[MemberSubscription],
    topic_partitions: &BTreeMap<String, Vec<i32>>,
) -> Result<Vec<Vec<TopicPartition>>> {
    match strategy {
        ROUND_ROBIN_PROTOCOL => Ok(round_robin(members, topic_partitions)),
        RANGE_PROTOCOL => Ok(range(members, topic_partitions)),
        _ => Err(Error::Config(format!(
            "assignment strategy '{}' is not supported",
            strategy
        ))),
    }
}

/// The round robin assignor lays out all the available partitions and
/// all the available consumers. It then proceeds to do a round robin
/// assignment from partition to consumer, skipping consumers that are
/// not subscribed to the partition's topic. If the subscriptions of all
/// consumer instances are identical, then the partitions will be
/// uniformly distributed. (i.e., the partition ownership counts will
/// be within a delta of exactly one across all consumers.)
fn round_robin(
    members: &[MemberSubscription],
    topic_partitions: &BTreeMap<String, Vec<i32>>,
) -> Vec<Vec<TopicPartition>> {
    let mut member_assignments = vec![vec![]; members.len()];
    if members.is_empty() {
        return member_assignments;
    }

    let mut next_member = 0;
    for (topic_name, partitions) in topic_partitions.iter() {
        if !members.iter().any(|member| member.wants(topic_name)) {
            continue;
        }
        let mut partitions = partitions.clone();
        partitions.sort_unstable();

        for partition in partitions {
            while !members[next_member].wants(topic_name) {
                next_member = (next_member + 1) % members.len();
            }
            member_assignments[next_member].push(TopicPartition::new(topic_name, partition));
            next_member = (next_member + 1) % members.len();
        }
    }

    member_assignments
}

/// The range assignor works per topic. The partitions of a topic are
/// split into contiguous ranges, one per subscribed consumer, and the
/// first consumers get one extra partition when they do not divide evenly.
fn range(
    members: &[MemberSubscription],
    topic_partitions: &BTreeMap<String, Vec<i32>>,
) -> Vec<Vec<TopicPartition>> {
    let mut member_assignments = vec![vec![]; members.len()];

    for (topic_name, partitions) in topic_partitions.iter() {
        let subscribed: Vec<usize> = members
            .iter()
            .enumerate()
            .filter(|(_, member)| member.wants(topic_name))
            .map(|(index, _)| index)
            .collect();
        if subscribed.is_empty() {
            continue;
        }
        let mut partitions = partitions.clone();
        partitions.sort_unstable();

        let per_member = partitions.len() / subscribed.len();
        let with_extra = partitions.len() % subscribed.len();
        let mut start = 0;
        for (position, member_index) in subscribed.into_iter().enumerate() {
            let count = per_member + usize::from(position < with_extra);
            for partition in &partitions[start..start + count] {
                member_assignments[member_index].push(TopicPartition::new(topic_name, *partition));
            }
            start += count;
        }
    }

    member_assignments
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use super::{assign, MemberSubscription, RANGE_PROTOCOL, ROUND_ROBIN_PROTOCOL};
    use crate::topic_partition::TopicPartition;

    fn tp(topic: &str, partition: i32) -> TopicPartition {
        TopicPartition::new(topic, partition)
    }

    #[test]
    fn test_roundrobin_assignor() {
        // For example, suppose there are two consumers C0 and C1, two topics t0 and t1, and each topic has 3 partitions, resulting in partitions t0p0, t0p1, t0p2, t1p0, t1p1, and t1p2.
        let topics = BTreeMap::from([
            (String::from("t0"), vec![0, 1, 2]),
            (String::from("t1"), vec![0, 1, 2]),
        ]);
        let subscription = vec![String::from("t0"), String::from("t1")];
        let members = vec![
            MemberSubscription {
                member_id: "C0",
                topics: &subscription,
            },
            MemberSubscription {
                member_id: "C1",
                topics: &subscription,
            },
        ];

        let assignments = assign(ROUND_ROBIN_PROTOCOL, &members, &topics).unwrap();

        // C0: [t0p0, t0p2, t1p1]
        assert_eq!(assignments[0], vec![tp("t0", 0), tp("t0", 2), tp("t1", 1)]);
        // C1: [t0p1, t1p0, t1p2]
        assert_eq!(assignments[1], vec![tp("t0", 1), tp("t1", 0), tp("t1", 2)]);
    }

    #[test]
    fn test_roundrobin_skips_unsubscribed_members() {
        let topics = BTreeMap::from([
            (String::from("t0"), vec![0, 1]),
            (String::from("t1"), vec![0, 1]),
        ]);
        let both = vec![String::from("t0"), String::from("t1")];
        let only_t1 = vec![String::from("t1")];
        let members = vec![
            MemberSubscription {
                member_id: "C0",
                topics: &both,
            },
            MemberSubscription {
                member_id: "C1",
                topics: &only_t1,
            },
        ];

        let assignments = assign(ROUND_ROBIN_PROTOCOL, &members, &topics).unwrap();

        assert_eq!(assignments[0], vec![tp("t0", 0), tp("t0", 1), tp("t1", 1)]);
        assert_eq!(assignments[1], vec![tp("t1", 0)]);
    }

    #[test]
    fn test_range_assignor() {
        let topics = BTreeMap::from([(String::from("t0"), vec![0, 1, 2])]);
        let subscription = vec![String::from("t0")];
        let members = vec![
            MemberSubscription {
                member_id: "C0",
                topics: &subscription,
            },
            MemberSubscription {
                member_id: "C1",
                topics: &subscription,
            },
        ];

        let assignments = assign(RANGE_PROTOCOL, &members, &topics).unwrap();

        assert_eq!(assignments[0], vec![tp("t0", 0), tp("t0", 1)]);
        assert_eq!(assignments[1], vec![tp("t0", 2)]);
    }

    #[test]
    fn test_unknown_strategy() {
        assert!(assign("sticky", &[], &BTreeMap::new()).is_err());
    }
}
