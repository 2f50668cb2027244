mod credential;
mod switch;
