//! Tests for Page
//!
//! These tests verify:
//! - Bit-exact layout and metadata bytes
//! - Binary search hit/miss conventions
//! - Direct inserts keep entries sorted
//! - Split policy (half vs 7/8 on append)
//! - Copy-on-write boundary
//! - Corruption detection

use airtree::page::PageLayout;
use airtree::{AirError, Address, Novelty, Page, PageKind};

// =============================================================================
// Helper Functions
// =============================================================================

fn layout() -> PageLayout {
    PageLayout::new(8, 32).unwrap()
}

fn key(i: u64) -> [u8; 8] {
    i.to_be_bytes()
}

/// Bottom page holding keys `0..count` with novelty value addresses
fn filled_page(novelty: &mut Novelty, count: u64) -> Page {
    let mut page = Page::empty(PageKind::Bottom, layout(), novelty);
    for i in 0..count {
        let split = page.insert_at(i as usize, &key(i), Address::Novelty(1000 + i), novelty);
        assert!(split.is_none());
    }
    page
}

fn assert_sorted(page: &Page) {
    for i in 1..page.size() {
        assert!(page.key(i - 1) < page.key(i), "entries {} and {} out of order", i - 1, i);
    }
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_layout_sizes() {
    let layout = layout();
    assert_eq!(layout.entry_size(), 24);
    assert_eq!(layout.page_len(), 24 * 32 + 2);
    assert_eq!(layout.merge_limit(), 28);
}

#[test]
fn test_layout_rejects_out_of_range_geometry() {
    assert!(matches!(PageLayout::new(0, 32), Err(AirError::Config(_))));
    assert!(matches!(PageLayout::new(8, 0), Err(AirError::Config(_))));
    assert!(matches!(PageLayout::new(8, 1), Err(AirError::Config(_))));
    assert!(matches!(PageLayout::new(8, 256), Err(AirError::Config(_))));
    assert!(matches!(PageLayout::with_key_size(0), Err(AirError::Config(_))));

    assert_eq!(PageLayout::new(8, 2).unwrap().base(), 2);
    assert_eq!(PageLayout::new(8, 255).unwrap().base(), 255);
}

#[test]
fn test_widest_page_keeps_full_count() {
    let mut novelty = Novelty::new();
    let layout = PageLayout::new(8, 255).unwrap();
    let mut page = Page::empty(PageKind::Bottom, layout, &mut novelty);
    for i in 0..255u64 {
        assert!(page.insert_at(i as usize, &key(i), Address::Novelty(i), &mut novelty).is_none());
    }
    page.commit(&mut novelty).unwrap();

    let bytes = novelty.lookup(0).unwrap();
    let reread = Page::from_bytes(page.address(), layout, &bytes).unwrap();
    assert_eq!(reread.size(), 255);
    assert!(reread.need_split());
    assert_eq!(reread.key(254), &key(254)[..]);
}

#[test]
fn test_empty_page_metadata_bytes() {
    let mut novelty = Novelty::new();
    let page = Page::empty(PageKind::Internal, layout(), &mut novelty);
    let bytes = page.as_bytes();

    assert_eq!(bytes.len(), layout().page_len());
    assert_eq!(bytes[24 * 32], 5);
    assert_eq!(bytes[24 * 32 + 1], 0);
    assert!(page.address().is_novelty());
    assert_eq!(page.kind(), PageKind::Internal);
}

#[test]
fn test_entry_encoding_is_big_endian() {
    let mut novelty = Novelty::new();
    let mut page = Page::empty(PageKind::Bottom, layout(), &mut novelty);
    let address = Address::durable(0x0102_0304_0506_0708_1112_1314_1516_1718);

    page.insert_at(0, &key(9), address, &mut novelty);

    let bytes = page.as_bytes();
    assert_eq!(&bytes[..8], &key(9));
    assert_eq!(&bytes[8..24], &address.to_bytes());
    assert_eq!(bytes[8], 0x01);
    assert_eq!(bytes[24 * 32 + 1], 1);
    assert_eq!(page.child_address(0), address);
}

// =============================================================================
// Search Tests
// =============================================================================

#[test]
fn test_binary_search_hit_and_miss() {
    let mut novelty = Novelty::new();
    let mut page = Page::empty(PageKind::Bottom, layout(), &mut novelty);
    for (pos, k) in [10u64, 20, 30].iter().enumerate() {
        page.insert_at(pos, &key(*k), Address::Novelty(*k), &mut novelty);
    }

    assert_eq!(page.binary_search(&key(20)), Ok(1));
    assert_eq!(page.binary_search(&key(5)), Err(0));
    assert_eq!(page.binary_search(&key(25)), Err(2));
    assert_eq!(page.binary_search(&key(99)), Err(3));
}

#[test]
fn test_descend_index_picks_largest_min_key_not_above() {
    let mut novelty = Novelty::new();
    let mut page = Page::empty(PageKind::Internal, layout(), &mut novelty);
    for (pos, k) in [10u64, 20, 30].iter().enumerate() {
        page.insert_at(pos, &key(*k), Address::Novelty(*k), &mut novelty);
    }

    assert_eq!(page.descend_index(&key(5)), 0);
    assert_eq!(page.descend_index(&key(10)), 0);
    assert_eq!(page.descend_index(&key(25)), 1);
    assert_eq!(page.descend_index(&key(30)), 2);
    assert_eq!(page.descend_index(&key(1000)), 2);
}

#[test]
fn test_unsigned_byte_order() {
    let mut novelty = Novelty::new();
    let mut page = Page::empty(PageKind::Bottom, PageLayout::new(1, 4).unwrap(), &mut novelty);

    page.insert_at(0, &[0x01], Address::Novelty(1), &mut novelty);
    let pos = page.binary_search(&[0xff]).unwrap_err();
    page.insert_at(pos, &[0xff], Address::Novelty(2), &mut novelty);
    let pos = page.binary_search(&[0x80]).unwrap_err();
    page.insert_at(pos, &[0x80], Address::Novelty(3), &mut novelty);

    assert_eq!(page.key(0), &[0x01]);
    assert_eq!(page.key(1), &[0x80]);
    assert_eq!(page.key(2), &[0xff]);
}

// =============================================================================
// Insert / Split Tests
// =============================================================================

#[test]
fn test_insert_in_middle_shifts_entries() {
    let mut novelty = Novelty::new();
    let mut page = Page::empty(PageKind::Bottom, layout(), &mut novelty);
    page.insert_at(0, &key(1), Address::Novelty(1), &mut novelty);
    page.insert_at(1, &key(3), Address::Novelty(3), &mut novelty);
    page.insert_at(1, &key(2), Address::Novelty(2), &mut novelty);

    assert_eq!(page.size(), 3);
    assert_sorted(&page);
    assert_eq!(page.child_address(1), Address::Novelty(2));
    assert_eq!(page.child_address(2), Address::Novelty(3));
}

#[test]
fn test_full_page_needs_split() {
    let mut novelty = Novelty::new();
    let page = filled_page(&mut novelty, 32);

    assert_eq!(page.size(), 32);
    assert!(page.need_split());
    assert_sorted(&page);
}

#[test]
fn test_split_pos_policy() {
    let mut novelty = Novelty::new();
    let page = filled_page(&mut novelty, 32);

    assert_eq!(page.split_pos(0), 16);
    assert_eq!(page.split_pos(31), 16);
    assert_eq!(page.split_pos(32), 28);
}

#[test]
fn test_append_split_keeps_seven_eighths_left() {
    let mut novelty = Novelty::new();
    let mut page = filled_page(&mut novelty, 32);

    let sibling = page
        .insert_at(32, &key(32), Address::Novelty(2032), &mut novelty)
        .expect("full page must split");

    assert_eq!(page.size(), 28);
    assert_eq!(sibling.size(), 5);
    assert!(page.key(27) < sibling.min_key());
    assert_eq!(sibling.key(4), &key(32));
    assert_eq!(sibling.kind(), PageKind::Bottom);
    assert_ne!(sibling.address(), page.address());
    assert_sorted(&page);
    assert_sorted(&sibling);
}

#[test]
fn test_middle_split_halves_and_places_new_entry_left() {
    let mut novelty = Novelty::new();
    let mut page = Page::empty(PageKind::Bottom, layout(), &mut novelty);
    for i in 0..32u64 {
        page.insert_at(i as usize, &key(i * 2 + 2), Address::Novelty(i), &mut novelty);
    }

    let sibling = page
        .insert_at(0, &key(1), Address::Novelty(500), &mut novelty)
        .expect("full page must split");

    assert_eq!(page.size(), 17);
    assert_eq!(sibling.size(), 16);
    assert_eq!(page.min_key(), &key(1));
    assert!(page.key(page.size() - 1) < sibling.min_key());
}

#[test]
fn test_split_zeroes_vacated_slots() {
    let mut novelty = Novelty::new();
    let mut page = filled_page(&mut novelty, 10);
    let fresh = filled_page(&mut novelty, 6);

    let sibling = page.split(6, 4, &mut novelty);

    assert_eq!(page.size(), 6);
    assert_eq!(sibling.size(), 4);
    assert_eq!(sibling.min_key(), &key(6));
    assert_eq!(page.as_bytes(), fresh.as_bytes());
}

#[test]
fn test_need_merge() {
    let mut novelty = Novelty::new();
    let empty = Page::empty(PageKind::Bottom, layout(), &mut novelty);
    let twenty = filled_page(&mut novelty, 20);
    let ten = filled_page(&mut novelty, 10);
    let fourteen = filled_page(&mut novelty, 14);

    assert!(Page::need_merge(&empty, &twenty));
    assert!(Page::need_merge(&twenty, &empty));
    assert!(!Page::need_merge(&twenty, &ten));
    assert!(Page::need_merge(&fourteen, &fourteen));
}

// =============================================================================
// Copy-on-Write Tests
// =============================================================================

#[test]
fn test_mutable_copy_of_novelty_page_keeps_address() {
    let mut novelty = Novelty::new();
    let page = filled_page(&mut novelty, 3);
    let before = novelty.len();

    let copy = page.mutable_copy(&mut novelty);

    assert_eq!(copy.address(), page.address());
    assert_eq!(novelty.len(), before);
}

#[test]
fn test_mutable_copy_of_durable_page_allocates() {
    let mut novelty = Novelty::new();
    let page = filled_page(&mut novelty, 3);
    let durable = Address::from_content(page.as_bytes());
    let stored = Page::from_bytes(durable, layout(), page.as_bytes()).unwrap();

    let copy = stored.mutable_copy(&mut novelty);

    assert!(copy.address().is_novelty());
    assert_ne!(copy.address(), page.address());
    assert_eq!(copy.as_bytes(), stored.as_bytes());
    assert!(matches!(stored.commit(&mut novelty), Err(AirError::InvalidAddress(_))));
}

#[test]
fn test_commit_writes_back_to_novelty() {
    let mut novelty = Novelty::new();
    let mut page = Page::empty(PageKind::Bottom, layout(), &mut novelty);
    page.insert_at(0, &key(1), Address::Novelty(1), &mut novelty);

    page.commit(&mut novelty).unwrap();

    let staged = novelty.resolve(page.address()).unwrap();
    assert_eq!(staged.as_ref(), page.as_bytes());
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_from_bytes_rejects_wrong_length() {
    let result = Page::from_bytes(Address::Novelty(0), layout(), &[0u8; 10]);
    assert!(matches!(result, Err(AirError::Corruption(_))));
}

#[test]
fn test_from_bytes_rejects_unknown_type_tag() {
    let mut bytes = vec![0u8; layout().page_len()];
    bytes[24 * 32] = 9;
    let result = Page::from_bytes(Address::Novelty(0), layout(), &bytes);
    assert!(matches!(result, Err(AirError::Corruption(_))));
}

#[test]
fn test_from_bytes_rejects_oversized_count() {
    let mut bytes = vec![0u8; layout().page_len()];
    bytes[24 * 32] = PageKind::Bottom as u8;
    bytes[24 * 32 + 1] = 33;
    let result = Page::from_bytes(Address::Novelty(0), layout(), &bytes);
    assert!(matches!(result, Err(AirError::Corruption(_))));
}
