// Tests for the champ select automation core


#[cfg(test)]
mod test_selection_policy;

#[cfg(test)]
mod test_config;



#[cfg(test)]
mod test_monitor;
