mod client;

pub use client::{Item, ItemPages, PAGE_SIZE, ZootoolClient, ZootoolError};
