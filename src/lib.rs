//! estuary — a store-and-forward TCP chat server.
//!
//! Clients register a nickname with their first line, then exchange
//! `/all` broadcasts and `/msg` direct messages. Messages addressed to
//! offline nicknames are spooled to disk and replayed when a session
//! registers that nickname.

pub mod chat;
