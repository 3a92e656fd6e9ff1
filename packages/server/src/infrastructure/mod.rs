//! Infrastructure layer: wire DTOs and collaborator adapters.

pub mod dto;
pub mod repository;
