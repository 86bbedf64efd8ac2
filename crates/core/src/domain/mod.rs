pub mod booking;
pub mod customer;
pub mod menu;
pub mod order;
pub mod restaurant;
pub mod table;
