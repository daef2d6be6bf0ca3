pub mod health;
pub mod tenants;
pub mod users;

#[cfg(test)]
mod tests;
