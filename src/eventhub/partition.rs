//! Partition assignment for buffered sends.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Jenkins lookup3 `hashlittle2` over `data`; returns `(c, b)`.
pub fn compute_hash(data: &[u8], init1: u32, init2: u32) -> (u32, u32) {
    let mut a = 0xdead_beef_u32
        .wrapping_add(data.len() as u32)
        .wrapping_add(init1);
    let mut b = a;
    let mut c = a.wrapping_add(init2);

    let mut rest = data;
    while rest.len() > 12 {
        a = a.wrapping_add(read_u32(&rest[0..4]));
        b = b.wrapping_add(read_u32(&rest[4..8]));
        c = c.wrapping_add(read_u32(&rest[8..12]));
        mix(&mut a, &mut b, &mut c);
        rest = &rest[12..];
    }
    if rest.is_empty() {
        return (c, b);
    }

    let mut tail = [0u8; 12];
    tail[..rest.len()].copy_from_slice(rest);
    a = a.wrapping_add(read_u32(&tail[0..4]));
    b = b.wrapping_add(read_u32(&tail[4..8]));
    c = c.wrapping_add(read_u32(&tail[8..12]));
    finalize(&mut a, &mut b, &mut c);
    (c, b)
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

fn finalize(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

/// Signed 16-bit hash code of a partition key.
pub fn hash_code(partition_key: &str) -> i16 {
    let (c, b) = compute_hash(partition_key.as_bytes(), 0, 0);
    (c ^ b) as i16
}

/// Maps events to partitions: keyed events by hash, the rest round-robin.
#[derive(Debug)]
pub struct PartitionResolver {
    partitions: Vec<String>,
    next: AtomicUsize,
}

impl PartitionResolver {
    pub fn new(partitions: Vec<String>) -> Self {
        Self {
            partitions,
            next: AtomicUsize::new(0),
        }
    }

    pub fn partitions(&self) -> &[String] {
        &self.partitions
    }

    /// Next partition in round-robin order; `None` when there are no partitions.
    pub fn next_partition_id(&self) -> Option<&str> {
        if self.partitions.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.partitions.len();
        Some(&self.partitions[i])
    }

    /// Partition owning `partition_key`; stable for a fixed partition list.
    pub fn partition_id_for_key(&self, partition_key: &str) -> Option<&str> {
        if self.partitions.is_empty() {
            return None;
        }
        let count = self.partitions.len() as i32;
        let index = (i32::from(hash_code(partition_key)) % count).unsigned_abs() as usize;
        Some(&self.partitions[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_lookup3_reference_values() {
        assert_eq!(compute_hash(b"", 0, 0), (0xdead_beef, 0xdead_beef));
        let (c, _) = compute_hash(b"Four score and seven years ago", 0, 0);
        assert_eq!(c, 0x1777_0551);
        let (c, _) = compute_hash(b"Four score and seven years ago", 1, 0);
        assert_eq!(c, 0xcd62_8161);
    }

    #[test]
    fn test_round_robin_cycles() {
        let resolver = PartitionResolver::new(ids(3));
        let picked: Vec<&str> = (0..6).filter_map(|_| resolver.next_partition_id()).collect();
        assert_eq!(picked, ["0", "1", "2", "0", "1", "2"]);
        assert!(PartitionResolver::new(vec![]).next_partition_id().is_none());
    }

    #[test]
    fn test_key_assignment_is_stable_and_spread() {
        let resolver = PartitionResolver::new(ids(4));
        let first = resolver.partition_id_for_key("customer-42").unwrap().to_string();
        for _ in 0..10 {
            assert_eq!(resolver.partition_id_for_key("customer-42").unwrap(), first);
        }
        let seen: HashSet<&str> = (0..200)
            .filter_map(|i| resolver.partition_id_for_key(&format!("key-{}", i)))
            .collect();
        assert_eq!(seen.len(), 4);
        assert_eq!(resolver.partition_id_for_key(""), Some("0"));
    }
}
