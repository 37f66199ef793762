pub mod connection;
pub mod queries;
pub mod schema;
pub mod supabase;

pub use connection::*;
pub use queries::*;
pub use schema::*;
pub use supabase::{SupabaseConfig, SupabaseRepository};
