mod capacity;
mod codel;
mod fifo;
mod lifecycle;
mod pie;
mod sharing;
