pub mod jobdetail;
pub mod jobslist;
pub mod layout;
pub mod logview;
pub mod queues;
