/// Perform a const assertion.
macro_rules! const_assert {
    ($($tt:tt)*) => {
        const _: () = assert!($($tt)*);
    }
}

/// The allocation table and its entries.
pub mod allocation_table;
/// FlatFS blocks.
pub mod block;
/// Directory entries and entry names.
pub mod directory_entry;
/// Placement of the reserved regions on the volume.
pub mod layout;
