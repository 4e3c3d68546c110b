pub mod allocator;
pub mod family;
pub mod repository;
pub mod slots;

pub use allocator::SlotAllocator;
pub use family::FamilyBookingCoordinator;
pub use repository::SlotRepository;
