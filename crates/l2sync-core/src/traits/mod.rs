//! Core traits for the synchronizer
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`SourceIpProvider`]: Fetch the CDN edge-node IP list
//! - [`AddressBookClient`]: Raw firewall address book API
//! - [`AddressBookSyncer`]: Create-or-replace of one address group

pub mod source_ip;
pub mod address_book;

pub use source_ip::{SourceIpProvider, SourceIpRecord};
pub use address_book::{
    AddressBook, AddressBookClient, AddressBookPage, AddressBookSyncer, SyncOutcome,
};
