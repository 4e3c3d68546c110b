pub mod supabase;

pub use supabase::{SupabaseClient, is_conflict};
