//! topowatch: awaitable topology notification
//!
//! Clients long-poll with the topology version they last saw and are answered
//! as soon as the topology changes, or with the unchanged topology when their
//! wait budget runs out.

pub mod cli;
pub mod http_server;
pub mod observability;
pub mod topology;
