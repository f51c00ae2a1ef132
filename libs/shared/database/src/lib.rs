pub mod cascade;
pub mod supabase;

pub use cascade::{CascadeRule, Table, CASCADE_RULES};
pub use supabase::{SupabaseClient, SupabaseError};
