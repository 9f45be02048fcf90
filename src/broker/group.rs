//! Consumer group coordination
//!
//! Members are kept in join order. Partitions are handed out round-robin:
//! partition `p` belongs to the member at index `p % members`. Every join or
//! leave bumps the generation; assignments are recomputed from the current
//! membership each time a member polls.

pub type MemberId = u64;

#[derive(Debug, Default)]
pub struct ConsumerGroup {
    members: Vec<MemberId>,
    generation: u64,
}

impl ConsumerGroup {
    /// Add a member and return the new generation. Joining twice is a no-op.
    pub fn join(&mut self, member: MemberId) -> u64 {
        if !self.members.contains(&member) {
            self.members.push(member);
            self.generation += 1;
        }
        self.generation
    }

    /// Remove a member. Returns `false` if it was not in the group.
    pub fn leave(&mut self, member: MemberId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| *m != member);
        let left = self.members.len() != before;
        if left {
            self.generation += 1;
        }
        left
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Partitions currently owned by `member`, in ascending order.
    pub fn assignment(&self, member: MemberId, partitions: u32) -> Vec<u32> {
        let Some(index) = self.members.iter().position(|m| *m == member) else {
            return Vec::new();
        };
        let count = self.members.len();
        (0..partitions)
            .filter(|p| *p as usize % count == index)
            .collect()
    }

    pub fn owner_of(&self, partition: u32) -> Option<MemberId> {
        if self.members.is_empty() {
            return None;
        }
        self.members
            .get(partition as usize % self.members.len())
            .copied()
    }
}
