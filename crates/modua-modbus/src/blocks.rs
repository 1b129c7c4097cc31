// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Read block planning.
//!
//! Polling one request per tag wastes the bus. The planner groups a
//! device's tags into contiguous read blocks per register space:
//!
//! - tags are bucketed by space and sorted by start address
//! - a tag merges into the current block when it overlaps or is adjacent
//!   to it and the merged span stays within the space's block size limit
//! - a single tag wider than the limit is rejected (that tag only)
//!
//! Blocks never include addresses no tag covers, so a merged block reads
//! exactly the union of its members.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

use modua_core::address::{RegisterSpace, TagAddress};
use modua_core::error::ConfigError;
use modua_core::types::{TagDataType, TagId};

// =============================================================================
// Block Limits
// =============================================================================

/// Maximum units per read request, per register space.
///
/// Defaults follow the Modbus application protocol ceilings commonly
/// supported by PLCs: 2000 bits, 120 registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockLimits {
    /// Coils (FC 1).
    pub out_coils: u16,

    /// Discrete inputs (FC 2).
    pub in_coils: u16,

    /// Input registers (FC 4).
    pub int_regs: u16,

    /// Holding registers (FC 3).
    pub hold_regs: u16,
}

impl Default for BlockLimits {
    fn default() -> Self {
        Self {
            out_coils: 2000,
            in_coils: 2000,
            int_regs: 120,
            hold_regs: 120,
        }
    }
}

impl BlockLimits {
    /// Returns the limit for a register space.
    #[inline]
    pub fn limit_for(&self, space: RegisterSpace) -> u16 {
        match space {
            RegisterSpace::Coil => self.out_coils,
            RegisterSpace::DiscreteInput => self.in_coils,
            RegisterSpace::InputRegister => self.int_regs,
            RegisterSpace::HoldingRegister => self.hold_regs,
        }
    }
}

// =============================================================================
// Planner Types
// =============================================================================

/// A tag as seen by the planner.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTag {
    /// The tag identifier.
    pub id: TagId,

    /// Resolved address.
    pub address: TagAddress,

    /// Declared data type.
    pub data_type: TagDataType,

    /// Scan rate in milliseconds.
    pub scan_ms: u64,
}

impl PlannedTag {
    #[inline]
    fn span(&self) -> u32 {
        self.address.span(self.data_type)
    }
}

/// One tag's slice of a read block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockMember {
    /// The tag this slice belongs to.
    pub tag: TagId,

    /// Offset of the tag's first unit relative to the block start.
    pub offset: u16,

    /// Units (bits or registers) the tag occupies.
    pub units: u16,

    /// Element count of the tag.
    pub count: u16,

    /// Declared data type.
    pub data_type: TagDataType,
}

/// A contiguous read request covering one or more tags.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadBlock {
    /// The register space.
    pub space: RegisterSpace,

    /// 0-based protocol start address.
    pub start: u16,

    /// Units to read.
    pub count: u16,

    /// The fastest member scan rate; the block is due when this elapses.
    pub scan_ms: u64,

    /// Member tags, ordered by offset.
    pub members: Vec<BlockMember>,
}

impl ReadBlock {
    /// Index range of a member's data within the block response.
    #[inline]
    pub fn member_range(&self, member: &BlockMember) -> Range<usize> {
        member.offset as usize..(member.offset + member.units) as usize
    }

    /// Returns `true` if the block covers the given tag.
    pub fn contains(&self, tag: &TagId) -> bool {
        self.members.iter().any(|m| &m.tag == tag)
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Groups tags into read blocks, honoring the per-space size limits.
///
/// Returns the planned blocks and the configuration errors for tags that
/// could not be planned (each such tag is excluded, nothing else).
pub fn plan_blocks(tags: &[PlannedTag], limits: &BlockLimits) -> (Vec<ReadBlock>, Vec<ConfigError>) {
    let mut errors = Vec::new();
    let mut by_space: BTreeMap<RegisterSpace, Vec<&PlannedTag>> = BTreeMap::new();

    for tag in tags {
        let limit = limits.limit_for(tag.address.space);
        let span = tag.span();
        if span > limit as u32 {
            errors.push(ConfigError::BlockOverflow {
                tag: tag.id.to_string(),
                units: span.min(u16::MAX as u32) as u16,
                limit,
            });
            continue;
        }
        if tag.address.end(tag.data_type) > u16::MAX as u32 + 1 {
            errors.push(ConfigError::invalid_address(
                tag.id.to_string(),
                "tag extends past the end of the address space",
            ));
            continue;
        }
        by_space.entry(tag.address.space).or_default().push(tag);
    }

    let mut blocks = Vec::new();
    for (space, mut space_tags) in by_space {
        space_tags.sort_by_key(|t| (t.address.offset, t.id.clone()));
        let limit = limits.limit_for(space) as u32;

        let mut current: Option<ReadBlock> = None;
        for tag in space_tags {
            let tag_start = tag.address.offset as u32;
            let tag_end = tag.address.end(tag.data_type);

            if let Some(block) = current.as_mut() {
                let block_end = block.start as u32 + block.count as u32;
                let merged_end = block_end.max(tag_end);
                if tag_start <= block_end && merged_end - block.start as u32 <= limit {
                    block.count = (merged_end - block.start as u32) as u16;
                    block.scan_ms = block.scan_ms.min(tag.scan_ms);
                    block.members.push(member(tag, block.start));
                    continue;
                }
                blocks.push(current.take().unwrap());
            }

            current = Some(ReadBlock {
                space,
                start: tag.address.offset,
                count: tag.span() as u16,
                scan_ms: tag.scan_ms,
                members: vec![member(tag, tag.address.offset)],
            });
        }
        if let Some(block) = current {
            blocks.push(block);
        }
    }

    (blocks, errors)
}

fn member(tag: &PlannedTag, block_start: u16) -> BlockMember {
    BlockMember {
        tag: tag.id.clone(),
        offset: tag.address.offset - block_start,
        units: tag.span() as u16,
        count: tag.address.count,
        data_type: tag.data_type,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use modua_core::address::parse_address;

    fn tag(id: &str, address: &str, data_type: TagDataType) -> PlannedTag {
        PlannedTag {
            id: TagId::new(id),
            address: parse_address(address, true, true).unwrap(),
            data_type,
            scan_ms: 1000,
        }
    }

    #[test]
    fn test_adjacent_tags_merge() {
        let tags = vec![
            tag("a", "400001", TagDataType::Word),
            tag("b", "400002", TagDataType::Float),
            tag("c", "400004", TagDataType::Word),
        ];
        let (blocks, errors) = plan_blocks(&tags, &BlockLimits::default());
        assert!(errors.is_empty());
        assert_eq!(blocks.len(), 1);

        let block = &blocks[0];
        assert_eq!(block.start, 0);
        assert_eq!(block.count, 4);
        assert_eq!(block.members.len(), 3);
        assert_eq!(block.member_range(&block.members[1]), 1..3);
    }

    #[test]
    fn test_gap_starts_new_block() {
        let tags = vec![
            tag("a", "400001", TagDataType::Word),
            tag("b", "400010", TagDataType::Word),
        ];
        let (blocks, errors) = plan_blocks(&tags, &BlockLimits::default());
        assert!(errors.is_empty());
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].count, 1);
        assert_eq!(blocks[1].start, 9);
    }

    #[test]
    fn test_limit_splits_blocks() {
        // 121 consecutive words with a 120-register limit.
        let tags: Vec<_> = (0..121)
            .map(|i| tag(&format!("t{}", i), &format!("{}", 400001 + i), TagDataType::Word))
            .collect();
        let (blocks, errors) = plan_blocks(&tags, &BlockLimits::default());
        assert!(errors.is_empty());
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].count, 120);
        assert_eq!(blocks[1].count, 1);
    }

    #[test]
    fn test_every_tag_in_exactly_one_block() {
        let tags = vec![
            tag("a", "400001 [30]", TagDataType::Float),
            tag("b", "400050", TagDataType::Double),
            tag("c", "400061 [100]", TagDataType::Word),
            tag("d", "300001", TagDataType::Word),
            tag("e", "000001 [16]", TagDataType::Boolean),
        ];
        let (blocks, errors) = plan_blocks(&tags, &BlockLimits::default());
        assert!(errors.is_empty());

        for t in &tags {
            let covering: Vec<_> = blocks.iter().filter(|b| b.contains(&t.id)).collect();
            assert_eq!(covering.len(), 1, "tag {} covered by {} blocks", t.id, covering.len());
        }
    }

    #[test]
    fn test_oversized_tag_rejected_alone() {
        let tags = vec![
            tag("wide", "400001 [121]", TagDataType::Word),
            tag("ok", "400200", TagDataType::Word),
        ];
        let (blocks, errors) = plan_blocks(&tags, &BlockLimits::default());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ConfigError::BlockOverflow { .. }));
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].contains(&TagId::new("ok")));
    }

    #[test]
    fn test_blocks_cover_no_gaps() {
        let tags = vec![
            tag("a", "400001", TagDataType::Word),
            tag("b", "400003", TagDataType::Word),
        ];
        let (blocks, _) = plan_blocks(&tags, &BlockLimits::default());
        // A one-register gap is not spanned.
        assert_eq!(blocks.len(), 2);
        let total: u32 = blocks.iter().map(|b| b.count as u32).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_block_scan_is_fastest_member() {
        let mut fast = tag("fast", "400002", TagDataType::Word);
        fast.scan_ms = 200;
        let tags = vec![tag("slow", "400001", TagDataType::Word), fast];
        let (blocks, _) = plan_blocks(&tags, &BlockLimits::default());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].scan_ms, 200);
    }

    #[test]
    fn test_bit_space_limit() {
        let limits = BlockLimits {
            in_coils: 100,
            ..BlockLimits::default()
        };
        let tags = vec![
            tag("a", "100001 [80]", TagDataType::Boolean),
            tag("b", "100081 [80]", TagDataType::Boolean),
        ];
        let (blocks, errors) = plan_blocks(&tags, &limits);
        assert!(errors.is_empty());
        assert_eq!(blocks.len(), 2);
    }
}
