mod health_check;
mod helpers;
mod imprimir;
mod notas;
